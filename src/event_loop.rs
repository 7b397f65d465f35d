// event_loop.rs

use crate::clock::InternalClock;
use crate::midi::{InboundEvent, MidiEngine};
use crate::sync::queue::{QueueConsumer, QueueProducer};
use crate::sync::{SyncEngine, TransportState};
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// Everything the engine context consumes, in arrival order: decoded
/// transport events, internal master-mode ticks and control commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Inbound(InboundEvent),
    InternalTick,
    Control(ControlCommand),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    SetBpm(f64),
    BlockBpmUpdates(bool),
    BlockTransportSync(bool),
    SendSongPosition(u16),
    Shutdown,
}

/// Read-only view of the engine published after every processed event.
#[derive(Debug, Clone, Copy)]
pub struct EngineSnapshot {
    pub running: bool,
    pub bpm: f64,
    pub quarter_notes: f64,
    pub beats: i32,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        EngineSnapshot {
            running: false,
            bpm: crate::config::DEFAULT_BPM,
            quarter_notes: 0.0,
            beats: 0,
        }
    }
}

/// Control-surface handle: enqueues commands into the engine context and
/// reads state snapshots behind a short critical section.
#[derive(Clone)]
pub struct SyncHandle {
    events: QueueProducer<EngineEvent>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
}

impl SyncHandle {
    pub fn start(&self) {
        self.send(ControlCommand::Start);
    }

    pub fn stop(&self) {
        self.send(ControlCommand::Stop);
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.send(ControlCommand::SetBpm(bpm));
    }

    pub fn block_bpm_updates(&self, block: bool) {
        self.send(ControlCommand::BlockBpmUpdates(block));
    }

    pub fn block_transport_sync(&self, block: bool) {
        self.send(ControlCommand::BlockTransportSync(block));
    }

    pub fn send_song_position(&self, sixteenths: u16) {
        self.send(ControlCommand::SendSongPosition(sixteenths));
    }

    pub fn shutdown(&self) {
        self.send(ControlCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.lock().unwrap().running
    }

    pub fn current_bpm(&self) -> f64 {
        self.snapshot.lock().unwrap().bpm
    }

    pub fn position_quarter_notes(&self) -> f64 {
        self.snapshot.lock().unwrap().quarter_notes
    }

    pub fn position_beats(&self) -> i32 {
        self.snapshot.lock().unwrap().beats
    }

    fn send(&self, command: ControlCommand) {
        self.events.push(EngineEvent::Control(command));
    }
}

/// The engine context: a single consumer that drains the event queue and
/// drives the state machine. There is no parallelism inside; one event is
/// fully processed (note-on, note-off, notifications and all) before the
/// next is looked at.
pub struct EngineLoop<E: MidiEngine> {
    engine: SyncEngine<E>,
    events: QueueConsumer<EngineEvent>,
    producer: QueueProducer<EngineEvent>,
    timer: InternalClock,
    snapshot: Arc<Mutex<EngineSnapshot>>,
}

impl<E: MidiEngine> EngineLoop<E> {
    pub fn new(
        engine: SyncEngine<E>,
        events: QueueConsumer<EngineEvent>,
        producer: QueueProducer<EngineEvent>,
    ) -> Self {
        let timer = InternalClock::new(producer.clone());
        EngineLoop {
            engine,
            events,
            producer,
            timer,
            snapshot: Arc::new(Mutex::new(EngineSnapshot::default())),
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            events: self.producer.clone(),
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    pub fn engine(&self) -> &SyncEngine<E> {
        &self.engine
    }

    /// Runs until a Shutdown command arrives or every producer is gone.
    pub fn run(&mut self) {
        info!("engine loop started");
        loop {
            match self.events.recv() {
                Ok(event) => {
                    let keep_going = self.dispatch(event);
                    self.publish_snapshot();
                    if !keep_going {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        self.timer.stop();
        info!("engine loop stopped");
    }

    fn dispatch(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Inbound(inbound) => {
                let was_running = self.engine.is_running();
                self.engine.handle_event(inbound);
                if was_running && !self.engine.is_running() {
                    return self.flush_stale_ticks();
                }
            }
            EngineEvent::InternalTick => self.engine.handle_internal_tick(),
            EngineEvent::Control(command) => return self.dispatch_control(command),
        }
        true
    }

    fn dispatch_control(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Start => {
                self.engine.start();
                self.timer.start(self.engine.tick_interval());
            }
            ControlCommand::Stop => {
                self.timer.stop();
                self.engine.stop();
                return self.flush_stale_ticks();
            }
            ControlCommand::SetBpm(bpm) => {
                self.engine.set_bpm(bpm);
                if self.engine.state() == TransportState::RunningMaster {
                    self.timer.set_interval(self.engine.tick_interval());
                }
            }
            ControlCommand::BlockBpmUpdates(block) => self.engine.block_bpm_updates(block),
            ControlCommand::BlockTransportSync(block) => self.engine.block_transport_sync(block),
            ControlCommand::SendSongPosition(sixteenths) => {
                self.engine.send_song_position(sixteenths)
            }
            ControlCommand::Shutdown => {
                self.timer.stop();
                return false;
            }
        }
        true
    }

    /// Stop is the cancellation primitive: tick events queued before the
    /// stop took effect must not extend the finished run. Anything that is
    /// not a tick is dispatched normally.
    fn flush_stale_ticks(&mut self) -> bool {
        let mut discarded = 0u32;
        while let Ok(event) = self.events.try_recv() {
            match event {
                EngineEvent::InternalTick | EngineEvent::Inbound(InboundEvent::Clock) => {
                    discarded += 1;
                }
                other => {
                    if discarded > 0 {
                        debug!("discarded {} stale tick events after stop", discarded);
                    }
                    return self.dispatch(other);
                }
            }
        }
        if discarded > 0 {
            debug!("discarded {} stale tick events after stop", discarded);
        }
        true
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot.running = self.engine.is_running();
        snapshot.bpm = self.engine.current_bpm();
        snapshot.quarter_notes = self.engine.position_quarter_notes();
        snapshot.beats = self.engine.position_beats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::midi::{MidiMessage, MockMidiEngine};
    use crate::sync::queue;

    fn loop_with_mock() -> (
        EngineLoop<MockMidiEngine>,
        QueueProducer<EngineEvent>,
        Arc<Mutex<Vec<MidiMessage>>>,
    ) {
        let (tx, rx) = queue::bounded(1024);
        let mock = MockMidiEngine::new();
        let log = mock.sent_log();
        let engine = SyncEngine::new(Some(mock), SyncConfig::default());
        let engine_loop = EngineLoop::new(engine, rx, tx.clone());
        (engine_loop, tx, log)
    }

    #[test]
    fn test_stale_ticks_are_flushed_after_stop() {
        let (mut engine_loop, tx, _log) = loop_with_mock();

        tx.push(EngineEvent::Inbound(InboundEvent::Start));
        for _ in 0..10 {
            tx.push(EngineEvent::Inbound(InboundEvent::Clock));
        }
        tx.push(EngineEvent::Inbound(InboundEvent::Stop));
        // These were queued "behind" the stop and must not restart motion
        for _ in 0..5 {
            tx.push(EngineEvent::Inbound(InboundEvent::Clock));
        }
        tx.push(EngineEvent::Control(ControlCommand::Shutdown));

        engine_loop.run();
        assert!(!engine_loop.engine().is_running());
        assert_eq!(engine_loop.engine().position_quarter_notes(), 0.0);
    }

    #[test]
    fn test_snapshot_tracks_engine() {
        let (mut engine_loop, tx, _log) = loop_with_mock();
        let handle = engine_loop.handle();

        tx.push(EngineEvent::Inbound(InboundEvent::Start));
        for _ in 0..48 {
            tx.push(EngineEvent::Inbound(InboundEvent::Clock));
        }
        tx.push(EngineEvent::Control(ControlCommand::Shutdown));
        engine_loop.run();

        assert!(handle.is_running());
        assert_eq!(handle.position_quarter_notes(), 2.0);
        assert_eq!(handle.position_beats(), 8);
        assert_eq!(handle.current_bpm(), 120.0);
    }

    #[test]
    fn test_control_commands_reach_engine() {
        let (mut engine_loop, _tx, log) = loop_with_mock();
        let handle = engine_loop.handle();

        handle.set_bpm(140.0);
        handle.send_song_position(64);
        handle.shutdown();
        engine_loop.run();

        assert_eq!(engine_loop.engine().current_bpm(), 140.0);
        assert!(log
            .lock()
            .unwrap()
            .contains(&MidiMessage::SongPosition(64)));
    }
}
