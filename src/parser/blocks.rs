use std::io::{self, SeekFrom};
use std::mem;

use log::{debug, warn};

use super::{
    color_table_len, ColorTable, DisposalMethod, FrameDescriptor, Header, LoopCount, Rect,
    Version,
};
use crate::cancel::CancellationToken;
use crate::error::{GifError, Result};
use crate::reader::{GifRead, MAX_SUB_BLOCK_LEN};

const SIGNATURE: &[u8; 3] = b"GIF";

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;
const EMPTY_BLOCK: u8 = 0x00;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

const NETSCAPE_IDENTIFIER: &[u8] = b"NETSCAPE2.0";
const NETSCAPE_LOOP_SUB_BLOCK: u8 = 1;

#[derive(Debug)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
    Unknown(u8),
}

impl From<u8> for ExtensionType {
    fn from(value: u8) -> Self {
        use ExtensionType::*;

        match value {
            APPLICATION_EXTENSION => Application,
            COMMENT_EXTENSION => Comment,
            GRAPHIC_CONTROL_EXTENSION => GraphicControl,
            PLAIN_TEXT_EXTENSION => PlainText,
            label => Unknown(label),
        }
    }
}

#[derive(Debug, Default)]
struct LogicalScreenDescriptor {
    screen_width: u16,
    screen_height: u16,
    global_color_table_flag: bool,
    background_color_index: u8,
}

#[derive(Debug)]
enum ParserState {
    ProcessMagic,
    ProcessLogicalScreenDescriptor,
    ProcessGlobalColorTable(usize),
    DetermineNextBlock,
    ProcessExtension(u8),
    ProcessImageDescriptor,
    ProcessTrailer,

    Done,
}

/// Walks the block structure of a GIF stream once, collecting frame
/// descriptors and the offsets of their compressed data. Pixel data is
/// skipped, never decompressed.
pub(crate) struct BlockParser<'a, R: ?Sized> {
    inner: &'a mut R,
    cancel: &'a CancellationToken,
    version: Option<Version>,
    logical_screen_descriptor: LogicalScreenDescriptor,
    global_color_table: Option<ColorTable>,
    header_size: u64,
    loop_count: Option<LoopCount>,
    frames: Vec<FrameDescriptor>,
    // collects extension data until its image descriptor shows up
    current_frame: FrameDescriptor,
    graphic_control_pending: bool,
    sub_block: [u8; MAX_SUB_BLOCK_LEN],
}

impl<'a, R: GifRead + ?Sized> BlockParser<'a, R> {
    pub(crate) fn new(inner: &'a mut R, cancel: &'a CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            version: None,
            logical_screen_descriptor: LogicalScreenDescriptor::default(),
            global_color_table: None,
            header_size: 0,
            loop_count: None,
            frames: Vec::new(),
            current_frame: FrameDescriptor::default(),
            graphic_control_pending: false,
            sub_block: [0; MAX_SUB_BLOCK_LEN],
        }
    }

    pub(crate) fn parse(mut self) -> Result<(Header, Vec<FrameDescriptor>)> {
        self.inner.seek(SeekFrom::Start(0))?;
        let mut state = ParserState::ProcessMagic;

        loop {
            if self.cancel.is_cancelled() {
                return Err(GifError::Cancelled);
            }
            debug!("begin parsing state {:?}", state);

            state = self.process_next_state(state)?;
            if let ParserState::Done = state {
                break;
            }
        }

        let version = self.version.ok_or(GifError::InvalidFormat)?;
        let screen = self.logical_screen_descriptor;
        let header = Header {
            version,
            width: screen.screen_width,
            height: screen.screen_height,
            global_color_table: self.global_color_table,
            background_color_index: screen.background_color_index,
            loop_count: self.loop_count.unwrap_or_default(),
            header_size: self.header_size,
        };

        debug!(
            "parsed {}x{} {:?} stream with {} frames, loop count {:?}",
            header.width,
            header.height,
            header.version,
            self.frames.len(),
            header.loop_count
        );
        Ok((header, self.frames))
    }

    fn process_next_state(&mut self, next_state: ParserState) -> Result<ParserState> {
        use ParserState::*;

        match next_state {
            ProcessMagic => {
                let signature = self.inner.read_fixed::<3>().map_err(|err| match err.kind() {
                    io::ErrorKind::UnexpectedEof => GifError::InvalidFormat,
                    _ => GifError::Io(err),
                })?;
                if &signature != SIGNATURE {
                    return Err(GifError::InvalidFormat);
                }

                let version = self.inner.read_fixed::<3>()?;
                self.version = Some(Version::try_from(&version)?);
                debug!("processed version, got {:?}", self.version);

                Ok(ProcessLogicalScreenDescriptor)
            }
            ProcessLogicalScreenDescriptor => {
                let screen_width = self.inner.read_u16()?;
                let screen_height = self.inner.read_u16()?;

                let packed_fields = self.inner.read_byte()?;
                let global_color_table_flag = packed_fields & 0b10000000 != 0;

                let background_color_index = self.inner.read_byte()?;
                // pixel aspect ratio
                self.inner.read_byte()?;

                self.logical_screen_descriptor = LogicalScreenDescriptor {
                    screen_width,
                    screen_height,
                    global_color_table_flag,
                    background_color_index,
                };
                debug!(
                    "processed logical screen descriptor, got: {:?}",
                    self.logical_screen_descriptor
                );

                if global_color_table_flag {
                    Ok(ProcessGlobalColorTable(color_table_len(packed_fields)))
                } else {
                    self.header_size = self.inner.stream_offset()?;
                    Ok(DetermineNextBlock)
                }
            }
            ProcessGlobalColorTable(len) => {
                let table = self.read_color_table(len)?;
                debug!("processed global color table with {} entries", table.len());
                self.global_color_table = Some(table);
                self.header_size = self.inner.stream_offset()?;

                Ok(DetermineNextBlock)
            }
            DetermineNextBlock => {
                let introducer_or_label = self.inner.read_byte()?;

                match introducer_or_label {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => Ok(ProcessExtension(self.inner.read_byte()?)),
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor),
                    TRAILER_LABEL => Ok(ProcessTrailer),
                    EMPTY_BLOCK => Ok(DetermineNextBlock),
                    label => {
                        debug!("skipping unknown block with label 0x{:02x}", label);
                        self.inner.skip_sub_blocks()?;
                        Ok(DetermineNextBlock)
                    }
                }
            }
            ProcessExtension(label) => self.process_extension(ExtensionType::from(label)),
            ProcessImageDescriptor => self.process_image_descriptor(),
            ProcessTrailer => {
                if self.graphic_control_pending {
                    debug!("dropping graphic control extension without an image");
                }
                Ok(Done)
            }
            Done => Ok(Done),
        }
    }

    fn process_extension(&mut self, label: ExtensionType) -> Result<ParserState> {
        use ExtensionType::*;

        debug!("processing extension type: {:?}", label);
        match label {
            GraphicControl => {
                let len = self.inner.read_sub_block(&mut self.sub_block)?;
                if len >= 4 {
                    // packed fields definition
                    // XXXYYYZW
                    // XXX = reserved, not needed
                    // YYY = disposal method, indicates what to do with graphic after displaying
                    // Z = user input flag
                    // W = transparent color flag
                    let packed_fields = self.sub_block[0];
                    let disposal_method = (packed_fields >> 2) & 0b00000111;
                    let delay_time = u16::from_le_bytes([self.sub_block[1], self.sub_block[2]]);

                    let frame = &mut self.current_frame;
                    frame.disposal_method = DisposalMethod::from_u8(disposal_method)
                        .unwrap_or_default();
                    frame.has_transparency = packed_fields & 0b00000001 != 0;
                    frame.transparent_index = self.sub_block[3];
                    frame.set_delay_centiseconds(delay_time);
                    // frames without this extension are never backed up
                    frame.should_backup = !matches!(
                        frame.disposal_method,
                        DisposalMethod::RestoreToPrevious | DisposalMethod::RestoreToBackground
                    );
                    self.graphic_control_pending = true;

                    debug!(
                        "processed graphic control extension: disposal {:?}, delay {:?}, transparency {:?}",
                        frame.disposal_method,
                        frame.delay,
                        frame.has_transparency.then_some(frame.transparent_index)
                    );
                } else {
                    debug!("graphic control extension is {} bytes long, ignoring it", len);
                }

                if len != 0 {
                    self.inner.skip_sub_blocks()?;
                }
            }
            Application => {
                let len = self.inner.read_sub_block(&mut self.sub_block)?;
                if len == 0 {
                    return Ok(ParserState::DetermineNextBlock);
                }

                if &self.sub_block[..len] == NETSCAPE_IDENTIFIER {
                    self.process_netscape_extension()?;
                } else {
                    warn!(
                        "skipping application extension {:?}",
                        String::from_utf8_lossy(&self.sub_block[..len])
                    );
                    self.inner.skip_sub_blocks()?;
                }
            }
            Comment | PlainText | Unknown(_) => {
                self.inner.skip_sub_blocks()?;
            }
        }

        Ok(ParserState::DetermineNextBlock)
    }

    fn process_netscape_extension(&mut self) -> Result<()> {
        loop {
            let len = self.inner.read_sub_block(&mut self.sub_block)?;
            if len == 0 {
                return Ok(());
            }

            if len >= 3 && self.sub_block[0] == NETSCAPE_LOOP_SUB_BLOCK {
                let loop_number = u16::from_le_bytes([self.sub_block[1], self.sub_block[2]]);
                self.loop_count = Some(match loop_number {
                    0 => LoopCount::Infinite,
                    number => LoopCount::Number(number),
                });
                debug!("processed netscape extension, loop count {:?}", self.loop_count);
            }
        }
    }

    fn process_image_descriptor(&mut self) -> Result<ParserState> {
        let left_position = self.inner.read_u16()?;
        let top_position = self.inner.read_u16()?;

        let width = self.inner.read_u16()?;
        let height = self.inner.read_u16()?;

        let packed_fields = self.inner.read_byte()?;
        let local_color_table_flag = packed_fields & 0b10000000 != 0;
        let interlace_flag = packed_fields & 0b01000000 != 0;

        let screen = &self.logical_screen_descriptor;
        let rect = Rect {
            x: left_position,
            y: top_position,
            width: width.min(screen.screen_width.saturating_sub(left_position)),
            height: height.min(screen.screen_height.saturating_sub(top_position)),
        };
        if rect.width != width || rect.height != height {
            debug!(
                "clamped frame {}x{} at ({}, {}) to {}x{}",
                width, height, left_position, top_position, rect.width, rect.height
            );
        }

        let local_color_table = if local_color_table_flag {
            Some(self.read_color_table(color_table_len(packed_fields))?)
        } else {
            None
        };

        let lzw_min_code_size = self.inner.read_byte()?;
        let data_offset = self.inner.stream_offset()?;
        self.inner.skip_sub_blocks()?;

        let mut frame = mem::take(&mut self.current_frame);
        frame.rect = rect;
        frame.interlaced = interlace_flag;
        frame.local_color_table = local_color_table;
        frame.lzw_min_code_size = lzw_min_code_size;
        frame.data_offset = data_offset;
        self.graphic_control_pending = false;

        debug!("processed image descriptor for frame {}: {:?}", self.frames.len(), frame.rect);
        self.frames.push(frame);

        Ok(ParserState::DetermineNextBlock)
    }

    fn read_color_table(&mut self, len: usize) -> Result<ColorTable> {
        let bytes = self.inner.read_bytes(3 * len)?;
        Ok(ColorTable::from_rgb(&bytes))
    }
}
