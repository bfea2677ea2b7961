use std::fmt;
use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::compositor::RenderOutcome;
use crate::decoder::GifDecoder;
use crate::error::Result;
use crate::parser::{FrameDescriptor, LoopCount};

/// Cumulative frame timestamps of one iteration.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// End time of each frame, relative to the start of the iteration.
    frame_ends: Box<[Duration]>,
    total: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePosition {
    pub frame: usize,
    /// Number of completed iterations.
    pub iteration: u64,
}

impl Timeline {
    pub fn new(frames: &[FrameDescriptor]) -> Self {
        let mut total = Duration::ZERO;
        let frame_ends = frames
            .iter()
            .map(|frame| {
                total = total.saturating_add(frame.delay);
                total
            })
            .collect();

        Self { frame_ends, total }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn frame_count(&self) -> usize {
        self.frame_ends.len()
    }

    pub fn frame_for_elapsed(&self, elapsed: Duration) -> TimelinePosition {
        if self.total.is_zero() {
            return TimelinePosition {
                frame: 0,
                iteration: 0,
            };
        }

        let total = self.total.as_nanos();
        let elapsed = elapsed.as_nanos();
        let offset = elapsed % total;

        // first frame that ends after the offset
        let frame = self
            .frame_ends
            .partition_point(|end| end.as_nanos() <= offset)
            .min(self.frame_ends.len() - 1);
        let iteration = u64::try_from(elapsed / total).unwrap_or(u64::MAX);

        TimelinePosition { frame, iteration }
    }
}

/// The frame shown after a call to [`GifPlayer::process_frame_time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFrame {
    pub index: usize,
    pub iteration: u64,
    /// Set only on the call that completed playback.
    pub finished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    /// Overrides the loop count stored in the file.
    pub iteration_count: Option<LoopCount>,
}

impl PlayerOptions {
    pub fn with_iteration_count(mut self, iteration_count: LoopCount) -> Self {
        self.iteration_count = Some(iteration_count);
        self
    }
}

/// Maps elapsed time onto frames of a [`GifDecoder`].
///
/// The player owns no clock. The host calls [`GifPlayer::process_frame_time`]
/// with the time elapsed since playback started and presents the decoder's
/// canvas afterwards.
pub struct GifPlayer<R> {
    decoder: Arc<GifDecoder<R>>,
    timeline: Timeline,
    iteration_count: LoopCount,
    current: Option<PlaybackFrame>,
    finished: bool,
    on_iteration_finished: Option<Box<dyn FnMut() + Send>>,
}

impl<R: Read + Seek> GifPlayer<R> {
    pub fn open(source: R, options: PlayerOptions) -> Result<Self> {
        let decoder = GifDecoder::open(source)?;
        Ok(Self::new(Arc::new(decoder), options))
    }

    /// Wraps an opened decoder and renders its first frame.
    pub fn new(decoder: Arc<GifDecoder<R>>, options: PlayerOptions) -> Self {
        let timeline = Timeline::new(decoder.frames());
        let iteration_count = options
            .iteration_count
            .unwrap_or(decoder.header().loop_count);

        let mut player = Self {
            decoder,
            timeline,
            iteration_count,
            current: None,
            finished: false,
            on_iteration_finished: None,
        };
        player.current = player.show(0, 0, false);
        player
    }

    /// Renders the frame that should be visible `elapsed` after playback
    /// started. Returns `None` when there is nothing to show, because the file
    /// has no frames or the decoder was cancelled or disposed.
    ///
    /// With a finite iteration count playback stops on the last frame once the
    /// count is reached; the completion listener runs once at that point.
    pub fn process_frame_time(&mut self, elapsed: Duration) -> Option<PlaybackFrame> {
        if self.timeline.frame_count() == 0 {
            return None;
        }

        let position = self.timeline.frame_for_elapsed(elapsed);
        let completed = match self.iteration_count {
            LoopCount::Number(count) => position.iteration >= u64::from(count),
            LoopCount::Infinite => false,
        };

        if !completed {
            return self.show(position.frame, position.iteration, false);
        }

        let last = self.timeline.frame_count() - 1;
        let raise = !self.finished;
        let shown = self.show(last, position.iteration, raise)?;

        if raise {
            self.finished = true;
            info!(
                "playback finished after {} iterations, {:?}",
                position.iteration, elapsed
            );
            if let Some(listener) = self.on_iteration_finished.as_mut() {
                listener();
            }
        }

        Some(shown)
    }

    /// Starts over from the first frame and re-arms the completion listener.
    pub fn restart(&mut self) -> Option<PlaybackFrame> {
        debug!("restarting playback");
        self.finished = false;
        self.current = None;

        match self.decoder.render_frame(0, true) {
            RenderOutcome::Rendered | RenderOutcome::Degraded { .. } | RenderOutcome::Unchanged => {
                self.current = Some(PlaybackFrame {
                    index: 0,
                    iteration: 0,
                    finished: false,
                });
                self.current
            }
            RenderOutcome::OutOfRange | RenderOutcome::Cancelled | RenderOutcome::Disposed => None,
        }
    }

    fn show(&mut self, index: usize, iteration: u64, finished: bool) -> Option<PlaybackFrame> {
        match self.decoder.render_frame(index, false) {
            RenderOutcome::Rendered | RenderOutcome::Unchanged => {}
            RenderOutcome::Degraded { frames } => {
                warn!("frame {} shown with blank frames {:?}", index, frames);
            }
            RenderOutcome::OutOfRange | RenderOutcome::Cancelled | RenderOutcome::Disposed => {
                return None;
            }
        }

        let frame = PlaybackFrame {
            index,
            iteration,
            finished,
        };
        self.current = Some(frame);
        Some(frame)
    }
}

impl<R> GifPlayer<R> {
    /// Shared handle for reading the canvas from another thread.
    pub fn decoder(&self) -> &Arc<GifDecoder<R>> {
        &self.decoder
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn iteration_count(&self) -> LoopCount {
        self.iteration_count
    }

    /// Changes the loop policy. Completion can be reported again afterwards.
    pub fn set_iteration_count(&mut self, iteration_count: LoopCount) {
        self.iteration_count = iteration_count;
        self.finished = false;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Registers the listener called when a finite iteration count runs out.
    pub fn on_iteration_finished(&mut self, listener: impl FnMut() + Send + 'static) {
        self.on_iteration_finished = Some(Box::new(listener));
    }

    /// The frame from the last successful render, without advancing time.
    pub fn last_frame(&self) -> Option<PlaybackFrame> {
        self.current
    }

    pub fn dispose(&self) {
        self.decoder.dispose();
    }
}

impl<R> fmt::Debug for GifPlayer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GifPlayer")
            .field("decoder", &self.decoder)
            .field("timeline", &self.timeline)
            .field("iteration_count", &self.iteration_count)
            .field("current", &self.current)
            .field("finished", &self.finished)
            .finish()
    }
}
