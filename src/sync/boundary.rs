//! Whole-note boundary scheduling.
//!
//! Decides, once per tick, whether to emit the beacon note-on for the
//! upcoming boundary and whether to release the previous note. Emission is
//! always referenced to the integer tick count, never to an accumulating
//! predicted time, so prediction cannot compound error across bars.

use crate::config::{
    SyncConfig, DEFAULT_BPM, MIN_EMISSION_ADVANCE_TICKS, TICKS_PER_BAR, TICKS_PER_BEAT,
};
use log::warn;

/// What the engine must do for the tick that was just processed. When both
/// fire, the release belongs to the previous note and precedes the note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDecision {
    /// Whole-note boundary index to emit a note-on for.
    pub emit_for: Option<i64>,
    /// Release the currently sounding note.
    pub release: bool,
}

#[derive(Debug)]
pub struct BoundaryScheduler {
    last_emitted_boundary: i64,
    note_on: bool,
    ticks_since_last_boundary: u32,
}

impl BoundaryScheduler {
    pub fn new() -> Self {
        BoundaryScheduler {
            last_emitted_boundary: -1,
            note_on: false,
            ticks_since_last_boundary: 0,
        }
    }

    /// Clears all per-run state. The engine releases any sounding note
    /// before calling this.
    pub fn reset(&mut self) {
        self.last_emitted_boundary = -1;
        self.note_on = false;
        self.ticks_since_last_boundary = 0;
    }

    pub fn is_note_on(&self) -> bool {
        self.note_on
    }

    /// Marks the sounding note released without a tick decision, used when
    /// Stop cuts a note short.
    pub fn clear_note(&mut self) {
        self.note_on = false;
    }

    pub fn last_emitted_boundary(&self) -> i64 {
        self.last_emitted_boundary
    }

    pub fn ticks_since_last_boundary(&self) -> u32 {
        self.ticks_since_last_boundary
    }

    /// Runs both per-tick decisions for `tick` at the live `bpm`.
    pub fn on_tick(&mut self, tick: u64, bpm: f64, config: &SyncConfig) -> TickDecision {
        let current_boundary = (tick / TICKS_PER_BAR) as i64;
        let quarter_notes = tick as f64 / TICKS_PER_BEAT as f64;

        self.ticks_since_last_boundary += 1;

        if self.last_emitted_boundary > current_boundary + 1 {
            warn!(
                "scheduler desync: last emitted boundary {} is ahead of position {} - clamping",
                self.last_emitted_boundary, current_boundary
            );
            self.last_emitted_boundary = current_boundary;
        }

        // Substitute a sane tempo for the advance window only; the stored
        // BPM is not ours to overwrite.
        let bpm = if bpm < config.bpm_min || bpm > config.bpm_max {
            DEFAULT_BPM
        } else {
            bpm
        };
        let ms_per_tick = (60_000.0 / bpm) / TICKS_PER_BEAT as f64;
        let advance_ticks =
            (config.emission_advance_ms / ms_per_tick).max(MIN_EMISSION_ADVANCE_TICKS);

        let ticks_to_next = (TICKS_PER_BAR - tick % TICKS_PER_BAR) as f64;
        let next_boundary = current_boundary + 1;

        // The very first downbeat cannot be predicted; emit it as soon as
        // the run starts moving.
        let first_downbeat =
            current_boundary == 0 && self.last_emitted_boundary < 0 && quarter_notes < 1.0;

        let emit_for = if first_downbeat {
            Some(current_boundary)
        } else if next_boundary > self.last_emitted_boundary && ticks_to_next <= advance_ticks {
            Some(next_boundary)
        } else {
            None
        };

        // Release is judged against the note state before this tick's
        // emission, so a freshly emitted note is never cut down.
        let position_in_boundary = quarter_notes - (current_boundary * 4) as f64;
        let release = self.note_on
            && position_in_boundary > 0.0
            && position_in_boundary < config.note_off_window_quarters;
        if release {
            self.note_on = false;
        }

        if let Some(boundary) = emit_for {
            self.last_emitted_boundary = boundary;
            self.note_on = true;
            self.ticks_since_last_boundary = 0;
        }

        TickDecision { emit_for, release }
    }

    /// Rebase after a backwards seek or a reposition while stopped. A
    /// position in the first half of its whole note counts as not yet
    /// emitted so the upcoming boundary still fires.
    pub fn rebase_for_seek(&mut self, quarter_notes: f64) {
        let whole_note = (quarter_notes / 4.0).floor() as i64;
        let fraction = quarter_notes - (whole_note * 4) as f64;
        self.last_emitted_boundary = if fraction < 2.0 {
            whole_note - 1
        } else {
            whole_note
        };
    }

    /// Rebase for Continue: the current whole note counts as pending so the
    /// next boundary emits on schedule.
    pub fn rebase_for_continue(&mut self, quarter_notes: f64) {
        let whole_note = (quarter_notes / 4.0).floor() as i64;
        self.last_emitted_boundary = whole_note - 1;
        self.resync_boundary_ticks(quarter_notes);
    }

    /// Recomputes the diagnostic tick counter from the fractional position,
    /// correcting any drift accumulated against the transport's own idea of
    /// the bar.
    pub fn resync_boundary_ticks(&mut self, quarter_notes: f64) {
        let whole_note = (quarter_notes / 4.0).floor() as i64;
        let fraction = quarter_notes - (whole_note * 4) as f64;
        self.ticks_since_last_boundary = (fraction * TICKS_PER_BEAT as f64) as u32;
    }
}

impl Default for BoundaryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ticks(
        scheduler: &mut BoundaryScheduler,
        range: std::ops::RangeInclusive<u64>,
        bpm: f64,
        config: &SyncConfig,
    ) -> Vec<(u64, TickDecision)> {
        range
            .map(|tick| (tick, scheduler.on_tick(tick, bpm, config)))
            .filter(|(_, d)| d.emit_for.is_some() || d.release)
            .collect()
    }

    #[test]
    fn test_first_downbeat_emits_immediately() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let decision = scheduler.on_tick(1, 120.0, &config);
        assert_eq!(decision.emit_for, Some(0));
        assert!(!decision.release);
        assert!(scheduler.is_note_on());
        assert_eq!(scheduler.last_emitted_boundary(), 0);
    }

    #[test]
    fn test_predictive_emission_at_120_bpm() {
        // 70ms at 120 BPM is 3.36 ticks, so boundary 1 emits at tick 93
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let events = run_ticks(&mut scheduler, 1..=96, 120.0, &config);

        let emissions: Vec<_> = events
            .iter()
            .filter_map(|(tick, d)| d.emit_for.map(|b| (*tick, b)))
            .collect();
        assert_eq!(emissions, vec![(1, 0), (93, 1)]);
    }

    #[test]
    fn test_release_just_after_crossing() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let events = run_ticks(&mut scheduler, 1..=100, 120.0, &config);

        let releases: Vec<_> = events
            .iter()
            .filter(|(_, d)| d.release)
            .map(|(tick, _)| *tick)
            .collect();
        // Downbeat note released on tick 2, boundary-1 note on tick 97
        assert_eq!(releases, vec![2, 97]);
    }

    #[test]
    fn test_minimum_advance_at_slow_tempo() {
        // At 20 BPM the 70ms lead is 0.56 ticks; the 1.5-tick floor applies
        // and boundary 1 emits at tick 95
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let emissions: Vec<_> = run_ticks(&mut scheduler, 1..=96, 20.0, &config)
            .into_iter()
            .filter_map(|(tick, d)| d.emit_for.map(|b| (tick, b)))
            .collect();
        assert_eq!(emissions, vec![(1, 0), (95, 1)]);
    }

    #[test]
    fn test_wide_advance_at_fast_tempo() {
        // At 300 BPM one tick is 8.33ms, so 70ms is 8.4 ticks and boundary
        // 1 emits at tick 88
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let emissions: Vec<_> = run_ticks(&mut scheduler, 1..=96, 300.0, &config)
            .into_iter()
            .filter_map(|(tick, d)| d.emit_for.map(|b| (tick, b)))
            .collect();
        assert_eq!(emissions, vec![(1, 0), (88, 1)]);
    }

    #[test]
    fn test_invalid_bpm_falls_back_for_advance_only() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        // BPM of 0 would blow up the window math; fallback behaves like 120
        let emissions: Vec<_> = run_ticks(&mut scheduler, 1..=96, 0.0, &config)
            .into_iter()
            .filter_map(|(tick, d)| d.emit_for.map(|b| (tick, b)))
            .collect();
        assert_eq!(emissions, vec![(1, 0), (93, 1)]);
    }

    #[test]
    fn test_no_duplicate_emission_per_boundary() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        let mut per_boundary = std::collections::HashMap::new();
        for tick in 1..=960 {
            if let Some(b) = scheduler.on_tick(tick, 120.0, &config).emit_for {
                *per_boundary.entry(b).or_insert(0) += 1;
            }
        }
        assert!(per_boundary.values().all(|&count| count == 1));
        assert_eq!(per_boundary.len(), 11);
    }

    #[test]
    fn test_ticks_since_boundary_stays_bounded() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        for tick in 1..=2000 {
            scheduler.on_tick(tick, 120.0, &config);
            assert!(scheduler.ticks_since_last_boundary() <= TICKS_PER_BAR as u32);
        }
    }

    #[test]
    fn test_desync_clamps_back_to_position() {
        let config = SyncConfig::default();
        let mut scheduler = BoundaryScheduler::new();
        scheduler.last_emitted_boundary = 50;
        scheduler.on_tick(96, 120.0, &config);
        assert_eq!(scheduler.last_emitted_boundary(), 1);
    }

    #[test]
    fn test_rebase_for_seek_first_half() {
        let mut scheduler = BoundaryScheduler::new();
        scheduler.last_emitted_boundary = 5;
        // qn 4.0 is at the start of whole note 1: boundary 1 may emit again
        scheduler.rebase_for_seek(4.0);
        assert_eq!(scheduler.last_emitted_boundary(), 0);
    }

    #[test]
    fn test_rebase_for_seek_second_half() {
        let mut scheduler = BoundaryScheduler::new();
        // qn 6.5 is past the midpoint of whole note 1: counts as emitted
        scheduler.rebase_for_seek(6.5);
        assert_eq!(scheduler.last_emitted_boundary(), 1);
    }

    #[test]
    fn test_rebase_for_continue() {
        let mut scheduler = BoundaryScheduler::new();
        scheduler.rebase_for_continue(9.0);
        assert_eq!(scheduler.last_emitted_boundary(), 1);
        assert_eq!(scheduler.ticks_since_last_boundary(), 24);
    }
}
