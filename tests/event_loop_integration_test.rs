use barsync::config::SyncConfig;
use barsync::event_loop::{EngineEvent, EngineLoop};
use barsync::midi::{InboundEvent, MidiMessage, MockMidiEngine};
use barsync::sync::queue;
use barsync::sync::SyncEngine;
use std::thread;
use std::time::Duration;

#[test]
fn integration_test_slave_run_through_the_loop() {
    let (events_tx, events_rx) = queue::bounded(4096);
    let mock = MockMidiEngine::new();
    let sent = mock.sent_log();
    let engine = SyncEngine::new(Some(mock), SyncConfig::default());
    let mut engine_loop = EngineLoop::new(engine, events_rx, events_tx.clone());
    let handle = engine_loop.handle();

    let worker = thread::spawn(move || {
        engine_loop.run();
    });

    // Feed a complete externally-clocked run
    events_tx.push(EngineEvent::Inbound(InboundEvent::Start));
    for _ in 0..192 {
        events_tx.push(EngineEvent::Inbound(InboundEvent::Clock));
    }
    events_tx.push(EngineEvent::Inbound(InboundEvent::Stop));
    handle.shutdown();
    worker.join().expect("engine loop thread panicked");

    let sent = sent.lock().unwrap();
    let ons = sent
        .iter()
        .filter(|m| matches!(m, MidiMessage::NoteOn { .. }))
        .count();
    // Boundaries 0, 4 and 8 over two bars
    assert_eq!(ons, 3);
    // Slave mode never echoes transport messages
    assert!(!sent.contains(&MidiMessage::Start));
    assert!(!sent.contains(&MidiMessage::Stop));
    assert!(!handle.is_running());
}

#[test]
fn integration_test_master_run_with_internal_clock() {
    let (events_tx, events_rx) = queue::bounded(4096);
    let mock = MockMidiEngine::new();
    let sent = mock.sent_log();
    let engine = SyncEngine::new(Some(mock), SyncConfig::default());
    let mut engine_loop = EngineLoop::new(engine, events_rx, events_tx);
    let handle = engine_loop.handle();

    let worker = thread::spawn(move || {
        engine_loop.run();
    });

    handle.start();
    // At 120 BPM a tick is ~20.8ms; half a second is roughly a beat
    thread::sleep(Duration::from_millis(500));
    handle.stop();
    handle.shutdown();
    worker.join().expect("engine loop thread panicked");

    let sent = sent.lock().unwrap();
    assert_eq!(sent.first(), Some(&MidiMessage::Start));
    assert!(sent.contains(&MidiMessage::Stop));

    let clocks = sent.iter().filter(|m| **m == MidiMessage::Clock).count();
    assert!(clocks >= 10, "expected at least 10 clocks, got {}", clocks);
    assert!(clocks <= 60, "expected at most 60 clocks, got {}", clocks);

    // The first downbeat fired and was balanced by the stop release
    let ons = sent
        .iter()
        .filter(|m| matches!(m, MidiMessage::NoteOn { .. }))
        .count();
    let offs = sent
        .iter()
        .filter(|m| matches!(m, MidiMessage::NoteOff { .. }))
        .count();
    assert!(ons >= 1);
    assert_eq!(ons, offs);
    assert!(!handle.is_running());
}

#[test]
fn integration_test_set_bpm_updates_snapshot() {
    let (events_tx, events_rx) = queue::bounded(256);
    let engine: SyncEngine<MockMidiEngine> = SyncEngine::new(None, SyncConfig::default());
    let mut engine_loop = EngineLoop::new(engine, events_rx, events_tx);
    let handle = engine_loop.handle();

    handle.set_bpm(180.0);
    // A trailing no-op event makes sure the snapshot after set_bpm is
    // published before shutdown ends the loop
    handle.block_bpm_updates(false);
    handle.shutdown();
    engine_loop.run();

    assert_eq!(handle.current_bpm(), 180.0);
}
