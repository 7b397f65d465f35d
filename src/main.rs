// main.rs

use barsync::cli::{self, Args, ClockSource};
use barsync::config::SyncConfig;
use barsync::event_loop::{EngineEvent, EngineLoop};
use barsync::logging;
use barsync::midi::MidirEngine;
use barsync::sync::queue::{self, DEFAULT_QUEUE_CAPACITY};
use barsync::sync::SyncEngine;
use clap::Parser;
use log::info;

fn main() {
    // Initialize logging
    if let Err(e) = logging::init_logger() {
        eprintln!("Failed to initialize logger: {}", e);
        std::process::exit(1);
    }

    info!("Starting barsync");
    let args = Args::parse();

    if args.device_list {
        for device in barsync::handle_device_list() {
            println!("{}", device);
        }
        return;
    }

    if let Some(device) = &args.bind_to_device {
        let devices = barsync::handle_device_list();
        if let Err(msg) = cli::validate_device(device, &devices) {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    }

    // Queue bridging the MIDI callback, the tick source and the control
    // surface into the engine context
    let (events_tx, events_rx) = queue::bounded(DEFAULT_QUEUE_CAPACITY);

    let inbound_tx = events_tx.clone();
    let midi_engine = match MidirEngine::new(args.bind_to_device.clone(), move |event| {
        inbound_tx.push(EngineEvent::Inbound(event));
    }) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to open MIDI device: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(device) = &args.bind_to_device {
        info!("Bound to MIDI device: {}", device);
    }

    let engine = SyncEngine::new(Some(midi_engine), SyncConfig::default());
    let mut engine_loop = EngineLoop::new(engine, events_rx, events_tx);
    let handle = engine_loop.handle();

    handle.set_bpm(args.bpm);
    match args.clock_source {
        ClockSource::Internal => {
            info!("Running as clock master at {} BPM", args.bpm);
            handle.start();
        }
        ClockSource::External => {
            info!("Waiting for external transport");
        }
    }

    // The engine context runs on the main thread
    engine_loop.run();
}
