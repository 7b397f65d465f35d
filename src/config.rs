// config.rs

/// MIDI standard PPQ (Pulses Per Quarter Note)
pub const TICKS_PER_BEAT: u64 = 24;
/// SPP counts sixteenth notes, four per quarter note
pub const TICKS_PER_SIXTEENTH: u64 = TICKS_PER_BEAT / 4;
pub const BEATS_PER_BAR: u64 = 4;
/// One whole note = one 4/4 bar = the beacon emission interval
pub const TICKS_PER_BAR: u64 = TICKS_PER_BEAT * BEATS_PER_BAR;

pub const DEFAULT_BPM: f64 = 120.0;

/// Floor for the predictive emission window, in ticks. Keeps the beacon
/// ahead of the boundary even when the millisecond lead converts to less
/// than one tick at slow tempos.
pub const MIN_EMISSION_ADVANCE_TICKS: f64 = 1.5;

/// Tuning knobs for the sync engine and the beacon note.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Milliseconds before each whole-note boundary to emit note-on,
    /// compensating output-path latency.
    pub emission_advance_ms: f64,
    pub bpm_min: f64,
    pub bpm_max: f64,
    /// Minimum |delta| before an estimator proposal replaces the current BPM.
    pub bpm_change_threshold: f64,
    pub midi_channel: u8,
    pub midi_note: u8,
    pub midi_velocity: u8,
    /// How far past a crossed boundary (in quarter notes) a still-sounding
    /// beacon note is released.
    pub note_off_window_quarters: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            emission_advance_ms: 70.0,
            bpm_min: 20.0,
            bpm_max: 300.0,
            bpm_change_threshold: 0.5,
            midi_channel: 0,
            midi_note: 60,
            midi_velocity: 100,
            note_off_window_quarters: 0.4,
        }
    }
}
