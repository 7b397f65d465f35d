use std::error::Error;
use std::fmt;

/// A MIDI message the engine can send to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off message with note number and velocity
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// MIDI Clock timing message
    Clock,
    /// MIDI Start message
    Start,
    /// MIDI Stop message
    Stop,
    /// MIDI Continue message
    Continue,
    /// Song Position Pointer, 14-bit position in sixteenth notes
    SongPosition(u16),
}

/// A decoded transport event received from the device. This is what flows
/// through the inbound queue into the engine context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    Start,
    Stop,
    Continue,
    Clock,
    /// Song Position Pointer, 14-bit position in sixteenth notes
    SongPosition(u16),
    /// A system message the engine does not interpret, carrying its status
    /// byte. Includes malformed multi-byte messages.
    Unknown(u8),
}

#[derive(Debug)]
pub enum MidiError {
    ConnectionError(String),
    SendError(String),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::ConnectionError(msg) => write!(f, "MIDI connection error: {}", msg),
            MidiError::SendError(msg) => write!(f, "MIDI send error: {}", msg),
        }
    }
}

impl Error for MidiError {}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

/// Trait defining the interface for MIDI engine implementations
pub trait MidiEngine {
    /// Sends a MIDI message to the device
    fn send(&mut self, msg: MidiMessage) -> Result<()>;
}
