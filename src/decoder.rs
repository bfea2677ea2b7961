use std::fmt;
use std::io::{Read, Seek};

use log::debug;
use parking_lot::Mutex;
use rgb::{ComponentBytes, RGBA8};

use crate::cancel::CancellationToken;
use crate::compositor::{Compositor, RenderOutcome};
use crate::error::Result;
use crate::parser::{BlockParser, FrameDescriptor, Header};

struct DecoderState<R> {
    source: R,
    compositor: Compositor,
}

/// An opened GIF stream and the canvas its frames are composited into.
///
/// Parsing happens once in [`GifDecoder::open`]. Pixel data is decompressed
/// lazily by [`GifDecoder::render_frame`], which may be called from one thread
/// while another reads the canvas through [`GifDecoder::with_canvas`]; both go
/// through the same lock.
pub struct GifDecoder<R> {
    header: Header,
    frames: Box<[FrameDescriptor]>,
    state: Mutex<Option<DecoderState<R>>>,
    cancel: CancellationToken,
}

impl<R: Read + Seek> GifDecoder<R> {
    pub fn open(source: R) -> Result<Self> {
        Self::open_with_cancellation(source, CancellationToken::new())
    }

    /// Like [`GifDecoder::open`], with a token that can abandon parsing and
    /// later renders.
    pub fn open_with_cancellation(mut source: R, cancel: CancellationToken) -> Result<Self> {
        let (header, frames) = BlockParser::new(&mut source, &cancel).parse()?;
        let compositor = Compositor::new(&header, &frames);

        Ok(Self {
            header,
            frames: frames.into_boxed_slice(),
            state: Mutex::new(Some(DecoderState { source, compositor })),
            cancel,
        })
    }

    /// Composites frames up to `index` and leaves the result on the canvas.
    ///
    /// Forward steps only draw the frames in between; stepping backwards, or
    /// `force_clear`, starts over from a transparent canvas.
    pub fn render_frame(&self, index: usize, force_clear: bool) -> RenderOutcome {
        let mut state = self.state.lock();
        let Some(DecoderState { source, compositor }) = state.as_mut() else {
            return RenderOutcome::Disposed;
        };

        compositor.render(source, &self.header, &self.frames, index, force_clear, &self.cancel)
    }
}

impl<R> GifDecoder<R> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> u16 {
        self.header.width
    }

    pub fn height(&self) -> u16 {
        self.header.height
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Index of the frame currently on the canvas.
    pub fn current_frame(&self) -> Option<usize> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.compositor.previous_frame())
    }

    /// Runs `f` with the canvas, `width * height` pixels in row-major order.
    /// Returns `None` once the decoder has been disposed.
    pub fn with_canvas<T>(&self, f: impl FnOnce(&[RGBA8]) -> T) -> Option<T> {
        let state = self.state.lock();
        state.as_ref().map(|state| f(state.compositor.pixels()))
    }

    /// Copies the canvas as RGBA bytes into `target`, which must hold exactly
    /// `width * height * 4` bytes. Returns whether anything was copied.
    pub fn copy_canvas_to(&self, target: &mut [u8]) -> bool {
        self.with_canvas(|pixels| {
            let bytes = pixels.as_bytes();
            if bytes.len() != target.len() {
                return false;
            }
            target.copy_from_slice(bytes);
            true
        })
        .unwrap_or(false)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().is_none()
    }

    /// Cancels outstanding work and releases the canvas, the scratch buffers
    /// and the source. Safe to call more than once.
    pub fn dispose(&self) {
        self.cancel.cancel();
        if self.state.lock().take().is_some() {
            debug!("disposed decoder with {} frames", self.frames.len());
        }
    }
}

impl<R> fmt::Debug for GifDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GifDecoder")
            .field("header", &self.header)
            .field("frames", &self.frames.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::compositor::TRANSPARENT;
    use crate::error::GifError;
    use crate::parser::{DisposalMethod, LoopCount};
    use crate::test_utils::{init_logger, FrameSpec, GifBuilder};

    const PALETTE: [[u8; 3]; 4] = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 255]];

    fn open(builder: GifBuilder) -> GifDecoder<Cursor<Vec<u8>>> {
        init_logger();
        GifDecoder::open(Cursor::new(builder.build())).unwrap()
    }

    fn animation() -> GifBuilder {
        GifBuilder::new(3, 2)
            .global_palette(&PALETTE)
            .loop_count(0)
            .frame(FrameSpec::new(0, 0, 3, 2, vec![0; 6]).delay(5))
            .frame(FrameSpec::new(1, 0, 2, 2, vec![1, 2, 3, 1]).disposal(DisposalMethod::RestoreToBackground))
            .frame(FrameSpec::new(0, 1, 1, 1, vec![3]))
    }

    #[test]
    fn exposes_header_and_frames() {
        let decoder = open(animation());

        assert_eq!((decoder.width(), decoder.height()), (3, 2));
        assert_eq!(decoder.header().loop_count, LoopCount::Infinite);
        assert_eq!(decoder.frame_count(), 3);
        assert_eq!(decoder.frames()[1].disposal_method, DisposalMethod::RestoreToBackground);
        assert_eq!(decoder.current_frame(), None);
    }

    #[test]
    fn open_reports_format_errors() {
        init_logger();
        let result = GifDecoder::open(Cursor::new(b"\x89PNG\r\n\x1a\n".to_vec()));
        assert!(matches!(result, Err(GifError::InvalidFormat)));

        let mut bytes = animation().build();
        bytes[4] = b'7';
        bytes[5] = b'b';
        let result = GifDecoder::open(Cursor::new(bytes));
        assert!(matches!(result, Err(GifError::UnsupportedVersion(_))));

        let bytes = animation().without_trailer().build();
        let result = GifDecoder::open(Cursor::new(bytes));
        assert!(matches!(result, Err(GifError::TruncatedStream)));
    }

    #[test]
    fn open_rewinds_the_source() {
        init_logger();
        let mut source = Cursor::new(animation().build());
        source.set_position(17);
        let decoder = GifDecoder::open(source).unwrap();
        assert_eq!(decoder.frame_count(), 3);
    }

    #[test]
    fn rendering_twice_is_identical() {
        let decoder = open(animation());

        assert_eq!(decoder.render_frame(1, false), RenderOutcome::Rendered);
        let first = decoder.with_canvas(|pixels| pixels.to_vec()).unwrap();

        assert_eq!(decoder.render_frame(1, false), RenderOutcome::Unchanged);
        let second = decoder.with_canvas(|pixels| pixels.to_vec()).unwrap();

        assert_eq!(first, second);
        assert_eq!(decoder.current_frame(), Some(1));
    }

    #[test]
    fn force_clear_matches_fresh_render() {
        let decoder = open(animation());
        assert_eq!(decoder.render_frame(1, false), RenderOutcome::Rendered);
        assert_eq!(decoder.render_frame(2, true), RenderOutcome::Rendered);
        let forced = decoder.with_canvas(|pixels| pixels.to_vec()).unwrap();

        let fresh = open(animation());
        assert_eq!(fresh.render_frame(2, false), RenderOutcome::Rendered);
        let expected = fresh.with_canvas(|pixels| pixels.to_vec()).unwrap();

        assert_eq!(forced, expected);
        // frame 1 restored its rect to transparent before frame 2 was drawn
        assert_eq!(expected[1], TRANSPARENT);
        assert_eq!(expected[0], RGBA8::new(255, 0, 0, 255));
        assert_eq!(expected[3], RGBA8::new(255, 255, 255, 255));
    }

    #[test]
    fn copies_canvas_bytes() {
        let decoder = open(animation());
        assert_eq!(decoder.render_frame(0, false), RenderOutcome::Rendered);

        let mut target = vec![0; 3 * 2 * 4];
        assert!(decoder.copy_canvas_to(&mut target));
        assert_eq!(&target[..4], &[255, 0, 0, 255]);

        let mut short = vec![0; 5];
        assert!(!decoder.copy_canvas_to(&mut short));
    }

    #[test]
    fn dispose_is_idempotent() {
        let decoder = open(animation());
        assert_eq!(decoder.render_frame(0, false), RenderOutcome::Rendered);

        decoder.dispose();
        decoder.dispose();

        assert!(decoder.is_disposed());
        assert!(decoder.cancellation_token().is_cancelled());
        assert_eq!(decoder.render_frame(1, false), RenderOutcome::Disposed);
        assert_eq!(decoder.with_canvas(|pixels| pixels.len()), None);
        assert!(!decoder.copy_canvas_to(&mut [0; 24]));
    }

    #[test]
    fn cancelled_decoder_stops_rendering() {
        let decoder = open(animation());
        decoder.cancellation_token().cancel();
        assert_eq!(decoder.render_frame(2, false), RenderOutcome::Cancelled);
        assert_eq!(decoder.current_frame(), None);
    }

    #[test]
    fn renders_while_another_thread_reads() {
        let decoder = Arc::new(open(animation()));
        let reader = Arc::clone(&decoder);

        let handle = thread::spawn(move || {
            for _ in 0..200 {
                let opaque = reader.with_canvas(|pixels| pixels.iter().filter(|p| p.a == 255).count());
                // 6 after frames 0 and 1, 2 once frame 1 restored its rect
                assert!(matches!(opaque, Some(0 | 2 | 6)), "torn canvas: {:?}", opaque);
            }
        });

        for round in 0..200 {
            let _ = decoder.render_frame(round % 3, false);
        }
        handle.join().unwrap();
    }
}
