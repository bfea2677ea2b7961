use std::io::SeekFrom;

use super::FrameDescriptor;
use crate::cancel::CancellationToken;
use crate::error::LzwError;
use crate::reader::{CodeReader, GifRead};

const MAX_CODE_SIZE: u32 = 12;
const MAX_TABLE_SIZE: usize = 1 << MAX_CODE_SIZE;
const MAX_STACK_SIZE: usize = MAX_TABLE_SIZE + 1;
// color indices are bytes, so literals never need more than 8 bits
const MAX_MIN_CODE_SIZE: u8 = 8;

/// GIF flavoured LZW decoder.
///
/// The string table is stored as prefix/suffix pairs and expanded through an
/// explicit stack. Tables are allocated once and reused for every frame.
pub(crate) struct LzwDecoder {
    prefix: Box<[u16]>,
    suffix: Box<[u8]>,
    stack: Vec<u8>,
}

impl LzwDecoder {
    pub(crate) fn new() -> Self {
        Self {
            prefix: vec![0; MAX_TABLE_SIZE].into_boxed_slice(),
            suffix: vec![0; MAX_TABLE_SIZE].into_boxed_slice(),
            stack: Vec::with_capacity(MAX_STACK_SIZE),
        }
    }

    /// Seeks to the frame's compressed data and decodes it into `out`.
    pub(crate) fn decode_frame<R: GifRead + ?Sized>(
        &mut self,
        source: &mut R,
        frame: &FrameDescriptor,
        cancel: &CancellationToken,
        out: &mut [u8],
    ) -> Result<(), LzwError> {
        source.seek(SeekFrom::Start(frame.data_offset))?;
        let mut codes = CodeReader::new(source, cancel);
        self.decode(&mut codes, frame.lzw_min_code_size, out)
    }

    /// Fills `out` with color indices in scan order. Pixels the stream does not
    /// cover, because of an end code or the end of the data, are left at 0.
    pub(crate) fn decode<R: GifRead + ?Sized>(
        &mut self,
        codes: &mut CodeReader<'_, R>,
        min_code_size: u8,
        out: &mut [u8],
    ) -> Result<(), LzwError> {
        out.fill(0);

        if !(1..=MAX_MIN_CODE_SIZE).contains(&min_code_size) {
            return Err(LzwError::StreamCorrupt("minimum code size out of range"));
        }

        let clear_code: u16 = 1 << min_code_size;
        let end_of_information_code = clear_code + 1;

        for code in 0..clear_code {
            self.prefix[usize::from(code)] = 0;
            self.suffix[usize::from(code)] = code as u8;
        }

        let mut code_size = u32::from(min_code_size) + 1;
        let mut available = end_of_information_code + 1;
        let mut last_code: Option<u16> = None;
        let mut first_index = 0u8;
        let mut written = 0;

        while written < out.len() {
            let Some(code) = codes.next_code(code_size)? else {
                break;
            };

            if code == clear_code {
                code_size = u32::from(min_code_size) + 1;
                available = end_of_information_code + 1;
                last_code = None;
                continue;
            }

            if code == end_of_information_code {
                break;
            }

            let Some(previous) = last_code else {
                // the first code after a clear must be a literal
                if code > clear_code {
                    return Err(LzwError::StreamCorrupt("first code is not a literal"));
                }
                out[written] = self.suffix[usize::from(code)];
                written += 1;
                first_index = code as u8;
                last_code = Some(code);
                continue;
            };

            self.stack.clear();
            let mut current = code;

            // {CODE-1}+K where K is the first index of {CODE-1}
            if code >= available {
                self.stack.push(first_index);
                current = previous;
            }

            while current >= clear_code {
                let slot = usize::from(current);
                if slot >= MAX_TABLE_SIZE || current == self.prefix[slot] {
                    return Err(LzwError::StreamCorrupt("self-referential code"));
                }

                self.stack.push(self.suffix[slot]);
                current = self.prefix[slot];

                if self.stack.len() >= MAX_STACK_SIZE {
                    return Err(LzwError::StreamCorrupt("code expands past the table size"));
                }
            }

            first_index = self.suffix[usize::from(current)];
            self.stack.push(first_index);

            // add {CODE-1}+K to the code table
            if usize::from(available) < MAX_TABLE_SIZE {
                self.prefix[usize::from(available)] = previous;
                self.suffix[usize::from(available)] = first_index;
                available += 1;

                if usize::from(available) == 1 << code_size && code_size < MAX_CODE_SIZE {
                    code_size += 1;
                }
            }

            last_code = Some(code);

            while let Some(index) = self.stack.pop() {
                if written == out.len() {
                    break;
                }
                out[written] = index;
                written += 1;
            }
        }

        Ok(())
    }
}
