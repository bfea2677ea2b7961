use log::{trace, warn};
use rgb::RGBA8;

use crate::cancel::CancellationToken;
use crate::error::LzwError;
use crate::parser::lzw::LzwDecoder;
use crate::parser::{ColorTable, DisposalMethod, FrameDescriptor, Header, Rect};
use crate::reader::GifRead;

pub const TRANSPARENT: RGBA8 = RGBA8 { r: 0, g: 0, b: 0, a: 0 };

/// (start row, step) of the four interlace passes.
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Result of a single render call.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The canvas now shows the requested frame.
    Rendered,
    /// The canvas shows the requested frame, but the listed frames failed to
    /// decompress and were drawn blank.
    Degraded { frames: Vec<usize> },
    /// The requested frame was already on the canvas.
    Unchanged,
    /// No frame with that index exists.
    OutOfRange,
    /// Cancellation was observed. A partially composited canvas is reset to
    /// transparent.
    Cancelled,
    /// The decoder has been disposed.
    Disposed,
}

enum FrameDraw {
    Drawn,
    Blank,
    Cancelled,
}

/// Full-size color buffer frames are painted into.
pub(crate) struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<RGBA8>,
}

impl Canvas {
    fn new(width: u16, height: u16) -> Self {
        let (width, height) = (usize::from(width), usize::from(height));
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; width * height],
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(TRANSPARENT);
    }

    fn clear_area(&mut self, area: Rect) {
        let x = usize::from(area.x).min(self.width);
        let end_x = (x + usize::from(area.width)).min(self.width);
        let end_y = (usize::from(area.y) + usize::from(area.height)).min(self.height);

        for y in usize::from(area.y)..end_y {
            let row = y * self.width;
            self.pixels[row + x..row + end_x].fill(TRANSPARENT);
        }
    }

    fn draw(&mut self, frame: &FrameDescriptor, palette: &ColorTable, indices: &[u8]) {
        let height = usize::from(frame.rect.height);

        if frame.interlaced {
            let mut source_row = 0;
            for (start, step) in INTERLACE_PASSES {
                for target_row in (start..height).step_by(step) {
                    self.draw_row(frame, palette, indices, source_row, target_row);
                    source_row += 1;
                }
            }
        } else {
            for row in 0..height {
                self.draw_row(frame, palette, indices, row, row);
            }
        }
    }

    fn draw_row(
        &mut self,
        frame: &FrameDescriptor,
        palette: &ColorTable,
        indices: &[u8],
        source_row: usize,
        target_row: usize,
    ) {
        let width = usize::from(frame.rect.width);
        let y = usize::from(frame.rect.y) + target_row;
        if y >= self.height {
            return;
        }
        let Some(row) = indices.get(source_row * width..(source_row + 1) * width) else {
            return;
        };

        for (column, &index) in row.iter().enumerate() {
            if frame.is_transparent(index) {
                continue;
            }

            let x = usize::from(frame.rect.x) + column;
            if x >= self.width {
                break;
            }
            if let Some(color) = palette.get(index) {
                self.pixels[y * self.width + x] = color;
            }
        }
    }
}

/// Composites frames onto a persistent canvas, tracking which frame it shows
/// so that forward steps only draw what changed.
pub(crate) struct Compositor {
    canvas: Canvas,
    index_buffer: Box<[u8]>,
    // only allocated when some frame restores to previous
    backup: Option<Box<[u8]>>,
    backup_frame: Option<usize>,
    previous_frame: Option<usize>,
    lzw: LzwDecoder,
}

impl Compositor {
    pub(crate) fn new(header: &Header, frames: &[FrameDescriptor]) -> Self {
        let pixel_count = header.pixel_count();
        let has_frame_backups = frames
            .iter()
            .any(|frame| frame.disposal_method == DisposalMethod::RestoreToPrevious);

        Self {
            canvas: Canvas::new(header.width, header.height),
            index_buffer: vec![0; pixel_count].into_boxed_slice(),
            backup: has_frame_backups.then(|| vec![0; pixel_count].into_boxed_slice()),
            backup_frame: None,
            previous_frame: None,
            lzw: LzwDecoder::new(),
        }
    }

    pub(crate) fn pixels(&self) -> &[RGBA8] {
        &self.canvas.pixels
    }

    pub(crate) fn previous_frame(&self) -> Option<usize> {
        self.previous_frame
    }

    /// Brings the canvas to the state right after `index` was displayed.
    pub(crate) fn render<R: GifRead + ?Sized>(
        &mut self,
        source: &mut R,
        header: &Header,
        frames: &[FrameDescriptor],
        index: usize,
        force_clear: bool,
        cancel: &CancellationToken,
    ) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }
        if index >= frames.len() {
            return RenderOutcome::OutOfRange;
        }
        if self.previous_frame == Some(index) {
            return RenderOutcome::Unchanged;
        }

        let seeking_backwards = self.previous_frame.is_some_and(|previous| index < previous);
        if index == 0 || force_clear || seeking_backwards {
            self.clear_image();
        }

        self.dispose_previous_frame(header, frames);

        let start = self.previous_frame.map_or(0, |previous| previous + 1);
        let mut blank_frames = Vec::new();

        for frame_index in start..=index {
            let frame = &frames[frame_index];

            if frame_index < index {
                match frame.disposal_method {
                    DisposalMethod::RestoreToPrevious => {
                        trace!("fast-forward skips frame {}", frame_index);
                        continue;
                    }
                    DisposalMethod::RestoreToBackground => {
                        trace!("fast-forward clears frame {}", frame_index);
                        self.canvas.clear_area(frame.rect);
                        continue;
                    }
                    DisposalMethod::Unspecified | DisposalMethod::DoNotDispose => {}
                }
            }

            match self.render_frame_at(source, header, frames, frame_index, cancel) {
                FrameDraw::Drawn => {}
                FrameDraw::Blank => blank_frames.push(frame_index),
                FrameDraw::Cancelled => {
                    self.clear_image();
                    return RenderOutcome::Cancelled;
                }
            }
        }

        if blank_frames.is_empty() {
            RenderOutcome::Rendered
        } else {
            RenderOutcome::Degraded {
                frames: blank_frames,
            }
        }
    }

    fn clear_image(&mut self) {
        self.canvas.clear();
        self.previous_frame = None;
        self.backup_frame = None;
    }

    fn dispose_previous_frame(&mut self, header: &Header, frames: &[FrameDescriptor]) {
        let Some(previous) = self.previous_frame else {
            return;
        };
        let frame = &frames[previous];

        match frame.disposal_method {
            DisposalMethod::RestoreToBackground => self.canvas.clear_area(frame.rect),
            DisposalMethod::RestoreToPrevious => match (self.backup.as_deref(), self.backup_frame) {
                (Some(backup), Some(backup_frame)) => {
                    let restored = &frames[backup_frame];
                    if let Some(palette) = restored.active_color_table(header) {
                        let pixel_count = restored.rect.pixel_count();
                        self.canvas.draw(restored, palette, &backup[..pixel_count]);
                    }
                }
                _ => self.canvas.clear_area(frame.rect),
            },
            DisposalMethod::Unspecified | DisposalMethod::DoNotDispose => {}
        }
    }

    fn render_frame_at<R: GifRead + ?Sized>(
        &mut self,
        source: &mut R,
        header: &Header,
        frames: &[FrameDescriptor],
        frame_index: usize,
        cancel: &CancellationToken,
    ) -> FrameDraw {
        if cancel.is_cancelled() {
            return FrameDraw::Cancelled;
        }

        let frame = &frames[frame_index];
        let pixel_count = frame.rect.pixel_count();
        let indices = &mut self.index_buffer[..pixel_count];

        let draw = match self.lzw.decode_frame(source, frame, cancel, indices) {
            Ok(()) => FrameDraw::Drawn,
            Err(LzwError::Cancelled) => return FrameDraw::Cancelled,
            Err(err) => {
                warn!("frame {} could not be decompressed, drawing it blank: {}", frame_index, err);
                indices.fill(0);
                FrameDraw::Blank
            }
        };

        if frame.should_backup {
            if let Some(backup) = self.backup.as_deref_mut() {
                backup[..pixel_count].copy_from_slice(indices);
                self.backup_frame = Some(frame_index);
            }
        }

        match frame.active_color_table(header) {
            Some(palette) => self.canvas.draw(frame, palette, indices),
            None => warn!("frame {} has no color table, nothing to draw", frame_index),
        }
        trace!("drew frame {} at {:?}", frame_index, frame.rect);

        self.previous_frame = Some(frame_index);
        draw
    }
}
