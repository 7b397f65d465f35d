use crate::midi::{InboundEvent, MidiEngine, MidiError, MidiMessage, Result};
use log::{debug, warn};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

/// MIDI engine backed by midir.
///
/// The input connection decodes raw bytes in the device callback and hands
/// each decoded event to the callback supplied at construction; that push
/// is the only work done in callback context. Output messages are encoded
/// and sent from whatever thread owns the engine.
pub struct MidirEngine {
    #[allow(dead_code)]
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
}

impl MidirEngine {
    /// Opens the input and output ports whose names contain `device_name`.
    /// Decoded inbound events are delivered through `on_event`.
    pub fn new<F>(device_name: Option<String>, on_event: F) -> Result<Self>
    where
        F: Fn(InboundEvent) + Send + 'static,
    {
        let input = if let Some(name) = &device_name {
            let mut midi_in = MidiInput::new("barsync-in")
                .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
            midi_in.ignore(Ignore::None);

            let in_ports = midi_in.ports();
            let in_port = in_ports
                .iter()
                .find(|p| midi_in.port_name(p).unwrap_or_default().contains(name))
                .ok_or_else(|| MidiError::ConnectionError("Input device not found".to_string()))?;

            let input = midi_in
                .connect(
                    in_port,
                    "barsync-input",
                    move |_stamp, message, _| {
                        if let Some(event) = MidirEngine::decode_message(message) {
                            on_event(event);
                        }
                    },
                    (),
                )
                .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
            Some(input)
        } else {
            None
        };

        let output = if let Some(name) = device_name {
            let midi_out = MidiOutput::new("barsync-out")
                .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

            let out_ports = midi_out.ports();
            let out_port = out_ports
                .iter()
                .find(|p| midi_out.port_name(p).unwrap_or_default().contains(&name))
                .ok_or_else(|| MidiError::ConnectionError("Output device not found".to_string()))?;
            Some(
                midi_out
                    .connect(out_port, "barsync-output")
                    .map_err(|e| MidiError::ConnectionError(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(MidirEngine { input, output })
    }

    /// Decodes raw MIDI bytes into the transport events the engine
    /// consumes. Channel voice messages and Active Sensing are not the
    /// engine's business and decode to None; other system messages are
    /// surfaced as Unknown so the engine can count and discard them.
    pub fn decode_message(data: &[u8]) -> Option<InboundEvent> {
        let status = *data.first()?;
        match status {
            0xF8 => Some(InboundEvent::Clock),
            0xFA => Some(InboundEvent::Start),
            0xFB => Some(InboundEvent::Continue),
            0xFC => Some(InboundEvent::Stop),
            0xF2 => {
                if data.len() >= 3 {
                    let position = u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7);
                    Some(InboundEvent::SongPosition(position))
                } else {
                    warn!("truncated Song Position Pointer: {:02X?}", data);
                    Some(InboundEvent::Unknown(status))
                }
            }
            // Active Sensing keepalives are noise at one per 300ms
            0xFE => None,
            0xF0..=0xFF => {
                debug!("unhandled system message: {:02X}", status);
                Some(InboundEvent::Unknown(status))
            }
            _ => {
                debug!("ignoring channel voice message: {:02X?}", data);
                None
            }
        }
    }

    fn message_to_bytes(msg: &MidiMessage) -> Vec<u8> {
        match msg {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), *note, *velocity],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), *note, *velocity],
            MidiMessage::Clock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Stop => vec![0xFC],
            MidiMessage::Continue => vec![0xFB],
            MidiMessage::SongPosition(position) => vec![
                0xF2,
                (position & 0x7F) as u8,
                ((position >> 7) & 0x7F) as u8,
            ],
        }
    }

    /// Lists available MIDI input devices
    pub fn list_devices() -> Vec<String> {
        let mut devices = Vec::new();

        if let Ok(midi_in) = MidiInput::new("barsync-list") {
            let ports = midi_in.ports();
            for port in ports {
                if let Ok(name) = midi_in.port_name(&port) {
                    devices.push(name);
                }
            }
        }

        devices
    }
}

impl MidiEngine for MidirEngine {
    fn send(&mut self, msg: MidiMessage) -> Result<()> {
        if let Some(output) = &mut self.output {
            let bytes = Self::message_to_bytes(&msg);
            debug!("sending MIDI message: {:02X?}", bytes);
            output
                .send(&bytes)
                .map_err(|e| MidiError::SendError(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_realtime_messages() {
        assert_eq!(
            MidirEngine::decode_message(&[0xF8]),
            Some(InboundEvent::Clock)
        );
        assert_eq!(
            MidirEngine::decode_message(&[0xFA]),
            Some(InboundEvent::Start)
        );
        assert_eq!(
            MidirEngine::decode_message(&[0xFB]),
            Some(InboundEvent::Continue)
        );
        assert_eq!(
            MidirEngine::decode_message(&[0xFC]),
            Some(InboundEvent::Stop)
        );
    }

    #[test]
    fn test_decode_song_position() {
        // 14-bit value: LSB | MSB << 7
        assert_eq!(
            MidirEngine::decode_message(&[0xF2, 0x10, 0x00]),
            Some(InboundEvent::SongPosition(16))
        );
        assert_eq!(
            MidirEngine::decode_message(&[0xF2, 0x7F, 0x7F]),
            Some(InboundEvent::SongPosition(16383))
        );
        assert_eq!(
            MidirEngine::decode_message(&[0xF2, 0x00, 0x01]),
            Some(InboundEvent::SongPosition(128))
        );
    }

    #[test]
    fn test_decode_truncated_song_position_is_unknown() {
        assert_eq!(
            MidirEngine::decode_message(&[0xF2, 0x10]),
            Some(InboundEvent::Unknown(0xF2))
        );
    }

    #[test]
    fn test_decode_active_sensing_is_ignored() {
        assert_eq!(MidirEngine::decode_message(&[0xFE]), None);
    }

    #[test]
    fn test_decode_system_reset_is_unknown() {
        assert_eq!(
            MidirEngine::decode_message(&[0xFF]),
            Some(InboundEvent::Unknown(0xFF))
        );
    }

    #[test]
    fn test_decode_ignores_channel_voice_and_empty() {
        assert_eq!(MidirEngine::decode_message(&[0x90, 60, 100]), None);
        assert_eq!(MidirEngine::decode_message(&[]), None);
    }

    #[test]
    fn test_message_encoding() {
        assert_eq!(
            MidirEngine::message_to_bytes(&MidiMessage::NoteOn {
                channel: 2,
                note: 60,
                velocity: 100
            }),
            vec![0x92, 60, 100]
        );
        assert_eq!(
            MidirEngine::message_to_bytes(&MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0
            }),
            vec![0x80, 60, 0]
        );
        assert_eq!(
            MidirEngine::message_to_bytes(&MidiMessage::Clock),
            vec![0xF8]
        );
        assert_eq!(
            MidirEngine::message_to_bytes(&MidiMessage::Start),
            vec![0xFA]
        );
        assert_eq!(
            MidirEngine::message_to_bytes(&MidiMessage::SongPosition(200)),
            vec![0xF2, 0x48, 0x01]
        );
    }
}
