//! Playback engine - drives sources from disk to the panel.
//!
//! **Architecture**: Player owns every resource of a session and sequences the
//! pipeline on the calling thread:
//!
//! ```text
//! Loader (worker thread) -> decode -> composite -> hook -> transmit -> wait -> latch
//! ```
//!
//! Only the loader runs concurrently; everything else is synchronous and must
//! not block for unbounded time.
//!
//! # Queue Depth
//!
//! Before source `n` is taken from the loader, submissions are topped up to
//! `n + capacity`, so the loader always works on the sources that follow the
//! one on the panel. Sequential mode submits by index until the list runs
//! out; shuffle mode samples with replacement and never ends.
//!
//! # Failure Handling
//!
//! Unreadable, undecodable and undersized sources are logged and skipped.
//! Dropped packets are logged by the transmitter. Nothing here is fatal.
//!
//! # Teardown
//!
//! Fields drop in declaration order, the reverse of acquisition: hook
//! (`destroy`), transmitter (socket closed), loader (worker joined), display
//! buffer, source list.

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::loader::{Loader, Payload};
use super::pacing::{Pacer, sleep_until};
use crate::config::PlaybackSettings;
use crate::entities::compositor::{self, CompositeError};
use crate::entities::decoder::{Animation, DecodeError};
use crate::entities::effects::Hook;
use crate::entities::frame::DisplayBuffer;
use crate::output::colorlight::{Link, Transmitter};

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
}

/// Result of playing one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceStats {
    pub frames: usize,
    pub seconds: f32,
}

impl SourceStats {
    pub fn fps(&self) -> f32 {
        if self.seconds > 0.0 {
            self.frames as f32 / self.seconds
        } else {
            0.0
        }
    }
}

/// Totals of a [`Player::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub played: usize,
    pub skipped: usize,
    pub frames: usize,
}

/// Session driver. Generic over the packet sink so tests can record output.
pub struct Player<L: Link> {
    hook: Hook,
    transmitter: Transmitter<L>,
    loader: Loader,
    buffer: DisplayBuffer,
    sources: Vec<PathBuf>,
    settings: PlaybackSettings,
    rng: StdRng,
    queued: usize,
    first_frame: bool,
    stop: Arc<AtomicBool>,
}

impl<L: Link> Player<L> {
    /// Assemble a session from already acquired resources.
    pub fn new(
        settings: PlaybackSettings,
        sources: Vec<PathBuf>,
        buffer: DisplayBuffer,
        loader: Loader,
        transmitter: Transmitter<L>,
        hook: Hook,
    ) -> Self {
        info!(
            "Player initialized: {}x{}, {} source(s), hook '{}'",
            buffer.width(),
            buffer.height(),
            sources.len(),
            hook.name()
        );

        Self {
            hook,
            transmitter,
            loader,
            buffer,
            sources,
            settings,
            rng: StdRng::from_entropy(),
            queued: 0,
            first_frame: true,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends playback between frames when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn buffer(&self) -> &DisplayBuffer {
        &self.buffer
    }

    pub fn transmitter(&self) -> &Transmitter<L> {
        &self.transmitter
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Play every source once (or forever in shuffle mode) until stopped.
    pub fn run(&mut self) -> PlaybackSummary {
        let mut summary = PlaybackSummary::default();

        if self.sources.is_empty() {
            warn!("No sources to play");
            return summary;
        }

        let mut source = 0;
        while (self.settings.shuffle || source < self.sources.len()) && !self.stopped() {
            self.fill_queue(source);
            source += 1;

            let Some(payload) = self.loader.take() else {
                summary.skipped += 1;
                continue;
            };

            match self.play_source(&payload) {
                Ok(stats) => {
                    summary.played += 1;
                    summary.frames += stats.frames;
                    info!(
                        "Played {} frames in {:.2} seconds at an average rate of {:.2} frames per second.",
                        stats.frames,
                        stats.seconds,
                        stats.fps()
                    );
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!("Skipping {}: {}", payload.path.display(), e);
                }
            }
        }

        debug!(
            "Playback finished: {} played, {} skipped, {} frames",
            summary.played, summary.skipped, summary.frames
        );
        summary
    }

    /// Keep `capacity` sources submitted ahead of `source`.
    fn fill_queue(&mut self, source: usize) {
        let depth = self.loader.capacity();

        while self.queued < source + depth {
            let path = if self.settings.shuffle {
                Some(&self.sources[self.rng.gen_range(0..self.sources.len())])
            } else {
                self.sources.get(self.queued)
            };

            if let Some(path) = path {
                trace!("Queueing {}", path.display());
                if let Err(e) = self.loader.submit(path) {
                    warn!("Failed to queue {}: {}", path.display(), e);
                }
            }

            self.queued += 1;
        }
    }

    /// Decode and play one source. Returns frame statistics.
    pub fn play_source(&mut self, payload: &Payload) -> Result<SourceStats, PlayError> {
        let animation = Animation::decode(&payload.bytes)?;
        let canvas = animation.canvas();
        let display = self.buffer.resolution();

        match animation.frame_count() {
            Some(count) => info!(
                "Decoding {} frames at a resolution of {}x{}.",
                count, canvas.0, canvas.1
            ),
            None => info!("Decoding frames at a resolution of {}x{}.", canvas.0, canvas.1),
        }

        if !compositor::covers(canvas, display) {
            return Err(CompositeError::Undersized { canvas, display }.into());
        }

        let settings = self.settings;
        let mut pacer = Pacer::new(settings.rate, settings.pacing);
        let mut frames = 0;

        for frame in animation {
            if self.stopped() {
                break;
            }
            let frame = frame?;

            compositor::composite(&mut self.buffer, &frame, settings.mix, self.first_frame)?;
            self.hook
                .update(display.0, display.1, self.buffer.as_mut_slice());
            self.transmitter.send_frame(&self.buffer);

            sleep_until(pacer.begin_frame(Instant::now()));
            self.transmitter
                .send_control(settings.control, settings.brightness);
            pacer.end_frame(frame.timestamp, Instant::now());

            self.first_frame = false;
            frames += 1;
        }

        if let Some(next) = pacer.next_target() {
            if !self.stopped() {
                sleep_until(next);
            }
        }

        let seconds = pacer
            .start()
            .map_or(0.0, |start| start.elapsed().as_secs_f32());

        Ok(SourceStats { frames, seconds })
    }
}
