//! GIF87a/89a decoding into composited RGBA frames for timed playback.
//!
//! [`GifDecoder`] parses a stream once and renders frames on demand into a
//! single canvas. [`GifPlayer`] maps elapsed time and a loop policy onto
//! those frames.

mod cancel;
mod compositor;
mod decoder;
mod error;
mod parser;
mod playback;
mod reader;

#[cfg(test)]
mod test_utils;

pub use cancel::CancellationToken;
pub use compositor::{RenderOutcome, TRANSPARENT};
pub use decoder::GifDecoder;
pub use error::{GifError, ParseLoopCountError, Result};
pub use parser::{
    ColorTable, DisposalMethod, FrameDescriptor, Header, LoopCount, Rect, Version,
    FRAME_DELAY_DEFAULT, FRAME_DELAY_THRESHOLD,
};
pub use playback::{GifPlayer, PlaybackFrame, PlayerOptions, Timeline, TimelinePosition};
pub use rgb::RGBA8;
