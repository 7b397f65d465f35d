//! BPM estimation from incoming MIDI clock pulses.
//!
//! Measures wall time across a window of exactly 24 clocks (one quarter
//! note) and proposes `60 / elapsed_seconds`. Proposals outside the
//! plausible range, below the change threshold, or arriving while updates
//! are blocked are discarded; the window restarts either way.

use crate::config::{SyncConfig, TICKS_PER_BEAT};
use std::time::Instant;

const WINDOW_TICKS: u32 = TICKS_PER_BEAT as u32;

/// Quarter-note durations outside this range imply a tempo no DAW sends;
/// treat them as transport hiccups rather than tempo changes.
const MIN_QUARTER_SECS: f64 = 0.2;
const MAX_QUARTER_SECS: f64 = 3.0;

#[derive(Debug)]
pub struct BpmEstimator {
    window_start: Instant,
    window_remaining: u32,
}

impl BpmEstimator {
    pub fn new() -> Self {
        BpmEstimator {
            window_start: Instant::now(),
            window_remaining: WINDOW_TICKS,
        }
    }

    /// Re-arms the window so the next 24 clocks span exactly one quarter
    /// note from `now`. Called on Start, Continue and song-position jumps
    /// so a transport gap is never read as a tempo.
    pub fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.window_remaining = WINDOW_TICKS;
    }

    /// Feeds one clock pulse. Returns an accepted BPM proposal, or None.
    pub fn on_clock(
        &mut self,
        now: Instant,
        current_bpm: f64,
        blocked: bool,
        config: &SyncConfig,
    ) -> Option<f64> {
        if self.window_remaining == 0 {
            self.window_start = now;
            self.window_remaining = WINDOW_TICKS;
        }

        self.window_remaining -= 1;
        if self.window_remaining > 0 {
            return None;
        }

        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        self.window_start = now;
        self.window_remaining = WINDOW_TICKS;

        if elapsed <= MIN_QUARTER_SECS || elapsed >= MAX_QUARTER_SECS {
            return None;
        }

        let proposed = 60.0 / elapsed;
        if proposed < config.bpm_min || proposed > config.bpm_max {
            return None;
        }
        if blocked || (proposed - current_bpm).abs() <= config.bpm_change_threshold {
            return None;
        }

        Some(proposed)
    }
}

impl Default for BpmEstimator {
    fn default() -> Self {
        Self::new()
    }
}
