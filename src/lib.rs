//! barsync couples to a MIDI clock master over a loopback transport,
//! follows its transport and timing, and emits a short beacon note at
//! every whole-note boundary, predictively offset so the note lands at the
//! audible output on the true downbeat.

pub mod cli;
pub mod clock;
pub mod config;
pub mod event_loop;
pub mod logging;
pub mod midi;
pub mod sync;

use midi::DefaultMidiEngine;

// Re-export the types most callers wire together
pub use cli::Args;
pub use config::SyncConfig;
pub use event_loop::{ControlCommand, EngineEvent, EngineLoop, SyncHandle};
pub use midi::{InboundEvent, MidiEngine, MidiMessage};
pub use sync::{SyncEngine, SyncObserver, TransportState};

pub fn handle_device_list() -> Vec<String> {
    DefaultMidiEngine::list_devices()
}
