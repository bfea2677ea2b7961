use super::byte_reader::{GifRead, MAX_SUB_BLOCK_LEN};
use crate::cancel::CancellationToken;
use crate::error::LzwError;

/// Pulls variable-width codes, least significant bit first, out of a chain of
/// data sub-blocks. Sub-blocks are read lazily, one at a time.
pub(crate) struct CodeReader<'a, R: ?Sized> {
    inner: &'a mut R,
    cancel: &'a CancellationToken,
    block: [u8; MAX_SUB_BLOCK_LEN],
    block_len: usize,
    cursor: usize,
    // bits not yet handed out, lowest bit first
    accumulator: u32,
    bits: u32,
    exhausted: bool,
}

impl<'a, R: GifRead + ?Sized> CodeReader<'a, R> {
    pub(crate) fn new(inner: &'a mut R, cancel: &'a CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            block: [0; MAX_SUB_BLOCK_LEN],
            block_len: 0,
            cursor: 0,
            accumulator: 0,
            bits: 0,
            exhausted: false,
        }
    }

    /// Returns the next `code_size`-bit code, or `None` once the block
    /// terminator has been reached.
    pub(crate) fn next_code(&mut self, code_size: u32) -> Result<Option<u16>, LzwError> {
        debug_assert!(code_size <= 12);

        while self.bits < code_size {
            if self.cursor == self.block_len && !self.fill_block()? {
                return Ok(None);
            }

            self.accumulator |= u32::from(self.block[self.cursor]) << self.bits;
            self.cursor += 1;
            self.bits += 8;
        }

        let code = self.accumulator & ((1 << code_size) - 1);
        self.accumulator >>= code_size;
        self.bits -= code_size;

        Ok(Some(code as u16))
    }

    fn fill_block(&mut self) -> Result<bool, LzwError> {
        if self.exhausted {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            return Err(LzwError::Cancelled);
        }

        self.block_len = self.inner.read_sub_block(&mut self.block)?;
        self.cursor = 0;
        if self.block_len == 0 {
            self.exhausted = true;
            return Ok(false);
        }
        Ok(true)
    }
}
