mod blocks;
pub(crate) mod lzw;

use std::str::FromStr;
use std::time::Duration;

use rgb::RGBA8;

use crate::error::{GifError, ParseLoopCountError};

pub(crate) use blocks::BlockParser;

/// Delays at or below this are treated as missing.
pub const FRAME_DELAY_THRESHOLD: Duration = Duration::from_millis(10);
/// Delay used in place of a missing or near-zero one.
pub const FRAME_DELAY_DEFAULT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V87a,
    V89a,
}

impl TryFrom<&[u8; 3]> for Version {
    type Error = GifError;

    fn try_from(value: &[u8; 3]) -> std::result::Result<Self, Self::Error> {
        match value {
            b"87a" => Ok(Version::V87a),
            b"89a" => Ok(Version::V89a),
            version => Err(GifError::UnsupportedVersion(
                String::from_utf8_lossy(version).into_owned(),
            )),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    #[default]
    Unspecified = 0,
    DoNotDispose = 1,
    RestoreToBackground = 2,
    RestoreToPrevious = 3,
}

impl DisposalMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisposalMethod::Unspecified),
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackground),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

/// How many times an animation is played.
///
/// Parses from `"infinite"`, `"forever"`, `"3"` or `"3x"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    Number(u16),
}

impl LoopCount {
    pub fn is_infinite(&self) -> bool {
        matches!(self, LoopCount::Infinite)
    }
}

impl Default for LoopCount {
    /// Without a Netscape extension a GIF plays once.
    fn default() -> Self {
        LoopCount::Number(1)
    }
}

impl FromStr for LoopCount {
    type Err = ParseLoopCountError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("infinite") || value.eq_ignore_ascii_case("forever") {
            return Ok(LoopCount::Infinite);
        }

        let digits = value.strip_suffix(['x', 'X']).unwrap_or(value);
        digits
            .parse()
            .map(LoopCount::Number)
            .map_err(|_| ParseLoopCountError(s.to_owned()))
    }
}

/// An immutable palette. Entries are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable(Box<[RGBA8]>);

impl ColorTable {
    pub(crate) fn from_rgb(bytes: &[u8]) -> Self {
        Self(
            bytes
                .chunks_exact(3)
                .map(|rgb| RGBA8::new(rgb[0], rgb[1], rgb[2], u8::MAX))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<RGBA8> {
        self.0.get(usize::from(index)).copied()
    }

    pub fn colors(&self) -> &[RGBA8] {
        &self.0
    }
}

/// Number of entries encoded in the low three bits of a packed field.
pub(crate) fn color_table_len(packed_fields: u8) -> usize {
    2 << (packed_fields & 0b00000111)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    pub width: u16,
    pub height: u16,
    pub global_color_table: Option<ColorTable>,
    /// Parsed but not used for compositing; disposal clears to transparent.
    pub background_color_index: u8,
    pub loop_count: LoopCount,
    /// Offset of the first block after the global color table.
    pub header_size: u64,
}

impl Header {
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    /// Clamped to the logical screen.
    pub rect: Rect,
    pub interlaced: bool,
    pub local_color_table: Option<ColorTable>,
    pub disposal_method: DisposalMethod,
    pub has_transparency: bool,
    pub transparent_index: u8,
    pub delay: Duration,
    pub(crate) lzw_min_code_size: u8,
    pub(crate) data_offset: u64,
    pub(crate) should_backup: bool,
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        Self {
            rect: Rect::default(),
            interlaced: false,
            local_color_table: None,
            disposal_method: DisposalMethod::Unspecified,
            has_transparency: false,
            transparent_index: 0,
            delay: FRAME_DELAY_DEFAULT,
            lzw_min_code_size: 0,
            data_offset: 0,
            should_backup: false,
        }
    }
}

impl FrameDescriptor {
    /// The local table if present, otherwise the global one.
    pub fn active_color_table<'a>(&'a self, header: &'a Header) -> Option<&'a ColorTable> {
        self.local_color_table
            .as_ref()
            .or(header.global_color_table.as_ref())
    }

    pub fn is_transparent(&self, index: u8) -> bool {
        self.has_transparency && index == self.transparent_index
    }

    pub(crate) fn set_delay_centiseconds(&mut self, delay: u16) {
        let delay = Duration::from_millis(u64::from(delay) * 10);
        self.delay = if delay <= FRAME_DELAY_THRESHOLD {
            FRAME_DELAY_DEFAULT
        } else {
            delay
        };
    }
}
