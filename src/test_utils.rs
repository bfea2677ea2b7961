//! Fixtures for building GIF streams in tests.

use std::collections::HashMap;

use crate::parser::DisposalMethod;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Packs codes least significant bit first, as GIF expects.
#[derive(Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    accumulator: u32,
    bits: u32,
}

impl BitWriter {
    pub(crate) fn write(&mut self, code: u16, size: u32) {
        self.accumulator |= u32::from(code) << self.bits;
        self.bits += size;
        while self.bits >= 8 {
            self.bytes.push(self.accumulator as u8);
            self.accumulator >>= 8;
            self.bits -= 8;
        }
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.bytes.push(self.accumulator as u8);
        }
        self.bytes
    }
}

/// A plain LZW encoder. Emits a clear code whenever the table is full.
pub(crate) fn lzw_encode(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear_code: u16 = 1 << min_code_size;
    let end_code = clear_code + 1;

    let mut writer = BitWriter::default();
    let mut table: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code = end_code + 1;
    let mut code_size = u32::from(min_code_size) + 1;

    writer.write(clear_code, code_size);

    let mut current: Option<u16> = None;
    for &index in indices {
        let Some(prefix) = current else {
            current = Some(u16::from(index));
            continue;
        };

        if let Some(&code) = table.get(&(prefix, index)) {
            current = Some(code);
            continue;
        }

        writer.write(prefix, code_size);
        if next_code < 4096 {
            table.insert((prefix, index), next_code);
            next_code += 1;
            if u32::from(next_code) > 1 << code_size && code_size < 12 {
                code_size += 1;
            }
        } else {
            writer.write(clear_code, code_size);
            table.clear();
            next_code = end_code + 1;
            code_size = u32::from(min_code_size) + 1;
        }
        current = Some(u16::from(index));
    }

    if let Some(prefix) = current {
        writer.write(prefix, code_size);
        // the decoder adds one more entry after reading the last code
        if next_code < 4096 {
            next_code += 1;
            if u32::from(next_code) > 1 << code_size && code_size < 12 {
                code_size += 1;
            }
        }
    }
    writer.write(end_code, code_size);

    writer.finish()
}

/// Splits `data` into length-prefixed sub-blocks followed by a terminator.
pub(crate) fn sub_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 255 + 2);
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
    out
}

fn palette_bits(len: usize) -> u8 {
    assert!(len.is_power_of_two() && (2..=256).contains(&len), "bad palette size {len}");
    (len.trailing_zeros() - 1) as u8
}

fn push_palette(out: &mut Vec<u8>, palette: &[[u8; 3]]) {
    for color in palette {
        out.extend_from_slice(color);
    }
}

pub(crate) struct FrameSpec {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    // in stream order, interlaced frames are not reordered
    indices: Vec<u8>,
    disposal: Option<DisposalMethod>,
    delay: Option<u16>,
    transparent: Option<u8>,
    interlaced: bool,
    local_palette: Option<Vec<[u8; 3]>>,
    min_code_size: u8,
}

impl FrameSpec {
    pub(crate) fn new(x: u16, y: u16, width: u16, height: u16, indices: Vec<u8>) -> Self {
        Self {
            x,
            y,
            width,
            height,
            indices,
            disposal: None,
            delay: None,
            transparent: None,
            interlaced: false,
            local_palette: None,
            min_code_size: 2,
        }
    }

    pub(crate) fn disposal(mut self, disposal: DisposalMethod) -> Self {
        self.disposal = Some(disposal);
        self
    }

    /// Delay in hundredths of a second.
    pub(crate) fn delay(mut self, centiseconds: u16) -> Self {
        self.delay = Some(centiseconds);
        self
    }

    pub(crate) fn transparent(mut self, index: u8) -> Self {
        self.transparent = Some(index);
        self
    }

    pub(crate) fn interlaced(mut self) -> Self {
        self.interlaced = true;
        self
    }

    pub(crate) fn local_palette(mut self, palette: &[[u8; 3]]) -> Self {
        self.local_palette = Some(palette.to_vec());
        self
    }

    pub(crate) fn min_code_size(mut self, min_code_size: u8) -> Self {
        self.min_code_size = min_code_size;
        self
    }

    fn write(&self, out: &mut Vec<u8>) {
        if self.disposal.is_some() || self.delay.is_some() || self.transparent.is_some() {
            let disposal = self.disposal.unwrap_or_default() as u8;
            let packed = (disposal << 2) | u8::from(self.transparent.is_some());
            out.extend_from_slice(&[0x21, 0xf9, 4, packed]);
            out.extend_from_slice(&self.delay.unwrap_or(0).to_le_bytes());
            out.extend_from_slice(&[self.transparent.unwrap_or(0), 0]);
        }

        out.push(0x2c);
        for field in [self.x, self.y, self.width, self.height] {
            out.extend_from_slice(&field.to_le_bytes());
        }

        let mut packed = 0;
        if self.interlaced {
            packed |= 0b01000000;
        }
        if let Some(palette) = &self.local_palette {
            packed |= 0b10000000 | palette_bits(palette.len());
        }
        out.push(packed);
        if let Some(palette) = &self.local_palette {
            push_palette(out, palette);
        }

        out.push(self.min_code_size);
        out.extend(sub_blocks(&lzw_encode(&self.indices, self.min_code_size)));
    }
}

pub(crate) struct GifBuilder {
    width: u16,
    height: u16,
    version: [u8; 3],
    global_palette: Option<Vec<[u8; 3]>>,
    loop_count: Option<u16>,
    frames: Vec<FrameSpec>,
    trailer: bool,
}

impl GifBuilder {
    pub(crate) fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            version: *b"89a",
            global_palette: None,
            loop_count: None,
            frames: Vec::new(),
            trailer: true,
        }
    }

    pub(crate) fn version(mut self, version: &[u8; 3]) -> Self {
        self.version = *version;
        self
    }

    pub(crate) fn global_palette(mut self, palette: &[[u8; 3]]) -> Self {
        self.global_palette = Some(palette.to_vec());
        self
    }

    /// Writes a Netscape application extension.
    pub(crate) fn loop_count(mut self, count: u16) -> Self {
        self.loop_count = Some(count);
        self
    }

    pub(crate) fn frame(mut self, frame: FrameSpec) -> Self {
        self.frames.push(frame);
        self
    }

    pub(crate) fn without_trailer(mut self) -> Self {
        self.trailer = false;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF");
        out.extend_from_slice(&self.version);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());

        let packed = match &self.global_palette {
            Some(palette) => 0b10000000 | palette_bits(palette.len()),
            None => 0,
        };
        // background color index, pixel aspect ratio
        out.extend_from_slice(&[packed, 0, 0]);
        if let Some(palette) = &self.global_palette {
            push_palette(&mut out, palette);
        }

        if let Some(count) = self.loop_count {
            out.extend_from_slice(&[0x21, 0xff, 11]);
            out.extend_from_slice(b"NETSCAPE2.0");
            out.extend_from_slice(&[3, 1]);
            out.extend_from_slice(&count.to_le_bytes());
            out.push(0);
        }

        for frame in &self.frames {
            frame.write(&mut out);
        }

        if self.trailer {
            out.push(0x3b);
        }
        out
    }
}
