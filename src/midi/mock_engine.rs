use crate::midi::{MidiEngine, MidiMessage, Result};
use std::sync::{Arc, Mutex};

/// Test double that records every message sent through it.
#[derive(Default)]
pub struct MockMidiEngine {
    sent: Arc<Mutex<Vec<MidiMessage>>>,
}

impl MockMidiEngine {
    pub fn new() -> Self {
        MockMidiEngine {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the send log, usable after the engine is moved.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<MidiMessage>>> {
        Arc::clone(&self.sent)
    }

    pub fn sent_messages(&self) -> Vec<MidiMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn list_devices() -> Vec<String> {
        vec!["Mock Device 1".to_string(), "Mock Device 2".to_string()]
    }
}

impl MidiEngine for MockMidiEngine {
    fn send(&mut self, msg: MidiMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_sends() {
        let mut engine = MockMidiEngine::new();
        let log = engine.sent_log();

        engine.send(MidiMessage::Start).unwrap();
        engine
            .send(MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            })
            .unwrap();

        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], MidiMessage::Start);
    }
}
