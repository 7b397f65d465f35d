//! Observer notifications from the sync engine.
//!
//! Notifications are fire-and-forget calls made from the engine context;
//! observers must not block. All methods default to no-ops so an observer
//! only implements what it cares about.

pub trait SyncObserver: Send {
    fn running_changed(&self, _running: bool) {}

    fn bpm_changed(&self, _bpm: f64) {}

    /// One inbound clock pulse was processed.
    fn clock_tick(&self) {}

    /// The beacon note-on for a whole-note boundary was sent; the argument
    /// is the boundary position in quarter notes.
    fn beat_sent(&self, _quarter_note: i32) {}

    fn position_changed(&self, _beats: i32, _quarter_notes: f64) {}
}
