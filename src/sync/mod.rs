//! The synchronization core: position accounting, tempo estimation,
//! boundary scheduling and the transport state machine that ties them to
//! the MIDI engine.
pub mod boundary;
pub mod bpm;
pub mod engine;
pub mod observer;
pub mod position;
pub mod queue;

pub use boundary::{BoundaryScheduler, TickDecision};
pub use bpm::BpmEstimator;
pub use engine::{SyncEngine, TransportState};
pub use observer::SyncObserver;
pub use position::PositionClock;
