//! Top-level synchronization state machine.
//!
//! The engine owns all per-run state and is only ever driven from one
//! thread (the engine context): inbound transport events and internal
//! master-mode ticks both arrive serially, so the scheduler's note-on and
//! note-off for a tick execute atomically with respect to any observer.

use crate::config::{SyncConfig, DEFAULT_BPM, TICKS_PER_BEAT};
use crate::midi::{InboundEvent, MidiEngine, MidiMessage};
use crate::sync::boundary::BoundaryScheduler;
use crate::sync::bpm::BpmEstimator;
use crate::sync::observer::SyncObserver;
use crate::sync::position::PositionClock;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    /// The internal tick source drives the run and clock pulses go out.
    RunningMaster,
    /// Inbound clock pulses drive the run; nothing is echoed back.
    RunningSlave,
}

pub struct SyncEngine<E: MidiEngine> {
    engine: Option<E>,
    config: SyncConfig,
    state: TransportState,
    position: PositionClock,
    bpm_estimator: BpmEstimator,
    scheduler: BoundaryScheduler,
    current_bpm: f64,
    incoming_clock_count: u64,
    bpm_update_blocked: bool,
    transport_sync_blocked: bool,
    observers: Vec<Box<dyn SyncObserver>>,
    send_failure_logged: bool,
}

impl<E: MidiEngine> SyncEngine<E> {
    pub fn new(engine: Option<E>, config: SyncConfig) -> Self {
        SyncEngine {
            engine,
            config,
            state: TransportState::Stopped,
            position: PositionClock::new(),
            bpm_estimator: BpmEstimator::new(),
            scheduler: BoundaryScheduler::new(),
            current_bpm: DEFAULT_BPM,
            incoming_clock_count: 0,
            bpm_update_blocked: false,
            transport_sync_blocked: false,
            observers: Vec::new(),
            send_failure_logged: false,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn SyncObserver>) {
        self.observers.push(observer);
    }

    // --- control surface ---------------------------------------------------

    /// Starts a master-mode run: fresh per-run state, outbound START. The
    /// caller must also start the internal tick source.
    pub fn start(&mut self) {
        self.reset_run_state();
        self.state = TransportState::RunningMaster;
        info!("transport started as clock master at {} BPM", self.current_bpm);
        self.send(MidiMessage::Start);
        self.notify_running_changed(true);
    }

    /// Stops the run, releasing any sounding note and echoing STOP to the
    /// device. User-initiated, so STOP is sent regardless of mode.
    pub fn stop(&mut self) {
        self.release_note_if_on();
        self.reset_run_state();
        self.state = TransportState::Stopped;
        info!("transport stopped");
        self.send(MidiMessage::Stop);
        self.notify_running_changed(false);
        self.notify_position_changed(0, 0.0);
    }

    /// Sets the tempo, clamped to the configured range. Notifies only on an
    /// actual change, and in master mode the caller must retune the tick
    /// source afterwards.
    pub fn set_bpm(&mut self, bpm: f64) {
        let clamped = bpm.clamp(self.config.bpm_min, self.config.bpm_max);
        if (clamped - self.current_bpm).abs() <= f64::EPSILON {
            return;
        }
        self.current_bpm = clamped;
        debug!("tempo set to {} BPM", clamped);
        self.notify_bpm_changed(clamped);
    }

    /// Suppresses estimator writes while the user is editing the tempo;
    /// window sampling continues underneath.
    pub fn block_bpm_updates(&mut self, block: bool) {
        self.bpm_update_blocked = block;
    }

    pub fn block_transport_sync(&mut self, block: bool) {
        self.transport_sync_blocked = block;
    }

    /// Sends a Song Position Pointer on explicit request.
    pub fn send_song_position(&mut self, sixteenths: u16) {
        self.send(MidiMessage::SongPosition(sixteenths));
    }

    // --- queries -----------------------------------------------------------

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != TransportState::Stopped
    }

    pub fn current_bpm(&self) -> f64 {
        self.current_bpm
    }

    pub fn position_quarter_notes(&self) -> f64 {
        self.position.quarter_notes()
    }

    pub fn position_beats(&self) -> i32 {
        self.position.beats()
    }

    pub fn incoming_clock_count(&self) -> u64 {
        self.incoming_clock_count
    }

    /// Period of one internal clock tick at the current tempo.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.current_bpm / TICKS_PER_BEAT as f64)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // --- inbound events ----------------------------------------------------

    pub fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Start => self.handle_daw_start(),
            InboundEvent::Stop => self.handle_daw_stop(),
            InboundEvent::Continue => self.handle_daw_continue(),
            InboundEvent::Clock => self.handle_clock(),
            InboundEvent::SongPosition(sixteenths) => self.handle_song_position(sixteenths),
            InboundEvent::Unknown(status) => {
                debug!("discarding unknown MIDI status byte {:02X}", status);
            }
        }
    }

    fn handle_daw_start(&mut self) {
        if self.transport_sync_blocked || self.is_running() {
            return;
        }
        self.transport_sync_blocked = true;
        self.reset_run_state();
        self.state = TransportState::RunningSlave;
        info!("following external transport start");
        // The DAW provides the clock; no internal timer and no START echo
        self.notify_running_changed(true);
        self.transport_sync_blocked = false;
    }

    fn handle_daw_stop(&mut self) {
        if self.transport_sync_blocked || !self.is_running() {
            return;
        }
        self.transport_sync_blocked = true;
        self.release_note_if_on();
        self.reset_run_state();
        self.state = TransportState::Stopped;
        info!("following external transport stop");
        // No STOP echo
        self.notify_running_changed(false);
        self.notify_position_changed(0, 0.0);
        self.transport_sync_blocked = false;
    }

    fn handle_daw_continue(&mut self) {
        if self.transport_sync_blocked || self.is_running() {
            return;
        }
        self.transport_sync_blocked = true;
        // Position survives; the boundary state is rebased so the current
        // whole note does not re-emit out of turn.
        let quarter_notes = self.position.quarter_notes();
        self.scheduler.rebase_for_continue(quarter_notes);
        self.bpm_estimator.reset(Instant::now());
        self.state = TransportState::RunningSlave;
        info!(
            "following external transport continue at {:.2} quarter notes",
            quarter_notes
        );
        self.notify_running_changed(true);
        self.transport_sync_blocked = false;
    }

    pub fn handle_clock(&mut self) {
        self.handle_clock_at(Instant::now());
    }

    /// Processes one inbound clock pulse observed at `now`. Split out so
    /// tests can drive the estimator with synthetic timestamps.
    pub fn handle_clock_at(&mut self, now: Instant) {
        self.incoming_clock_count += 1;

        if self.state == TransportState::RunningSlave {
            let tick = self.position.advance();
            self.run_scheduler(tick);

            // Tempo estimation runs after the emission work so it cannot
            // delay the beacon.
            if let Some(bpm) = self.bpm_estimator.on_clock(
                now,
                self.current_bpm,
                self.bpm_update_blocked,
                &self.config,
            ) {
                info!("tempo follows DAW: {:.2} BPM", bpm);
                self.current_bpm = bpm;
                self.notify_bpm_changed(bpm);
            }
        }

        self.notify_clock_tick();
    }

    /// Song Position Pointer: reposition, then decide whether the boundary
    /// state needs rebasing. During normal forward playback the clock-driven
    /// scheduler stays in charge so an SPP near a boundary cannot cause a
    /// double emission.
    pub fn handle_song_position(&mut self, sixteenths: u16) {
        let previous = self.position.quarter_notes();
        self.position.set_from_sixteenths(sixteenths);
        let quarter_notes = self.position.quarter_notes();

        let seeking_backwards = quarter_notes < previous - 0.5;
        if !self.is_running() || seeking_backwards {
            self.scheduler.rebase_for_seek(quarter_notes);
            debug!(
                "SPP rebase: position {:.2} qn, last emitted boundary {}",
                quarter_notes,
                self.scheduler.last_emitted_boundary()
            );
        }
        self.scheduler.resync_boundary_ticks(quarter_notes);

        // A jump makes the elapsed window meaningless as a tempo sample
        self.bpm_estimator.reset(Instant::now());

        if self.is_running() {
            self.run_scheduler(self.position.tick_count());
        }

        self.notify_position_changed(self.position.beats(), quarter_notes);
    }

    // --- internal ticks (master mode) --------------------------------------

    pub fn handle_internal_tick(&mut self) {
        if self.state != TransportState::RunningMaster {
            return;
        }
        let tick = self.position.advance();
        self.send(MidiMessage::Clock);
        self.run_scheduler(tick);
    }

    // --- internals ---------------------------------------------------------

    fn run_scheduler(&mut self, tick: u64) {
        let decision = self
            .scheduler
            .on_tick(tick, self.current_bpm, &self.config);

        if decision.release {
            self.send(MidiMessage::NoteOff {
                channel: self.config.midi_channel,
                note: self.config.midi_note,
                velocity: 0,
            });
            debug!(
                "beacon note off at tick {} ({:.2} qn)",
                tick,
                self.position.quarter_notes()
            );
        }

        if let Some(boundary) = decision.emit_for {
            self.send(MidiMessage::NoteOn {
                channel: self.config.midi_channel,
                note: self.config.midi_note,
                velocity: self.config.midi_velocity,
            });
            debug!(
                "beacon note on for boundary {} at tick {} ({:.2} BPM)",
                boundary, tick, self.current_bpm
            );
            self.notify_beat_sent((boundary * 4) as i32);
            self.notify_position_changed(self.position.beats(), self.position.quarter_notes());
        }
    }

    fn release_note_if_on(&mut self) {
        if self.scheduler.is_note_on() {
            self.send(MidiMessage::NoteOff {
                channel: self.config.midi_channel,
                note: self.config.midi_note,
                velocity: 0,
            });
            self.scheduler.clear_note();
        }
    }

    fn reset_run_state(&mut self) {
        self.position.reset();
        self.scheduler.reset();
        self.bpm_estimator.reset(Instant::now());
    }

    fn send(&mut self, msg: MidiMessage) {
        match self.engine.as_mut() {
            Some(engine) => {
                if let Err(err) = engine.send(msg) {
                    if !self.send_failure_logged {
                        warn!("dropping outbound MIDI messages: {}", err);
                        self.send_failure_logged = true;
                    }
                }
            }
            None => {
                if !self.send_failure_logged {
                    warn!("no MIDI output connected, dropping outbound messages");
                    self.send_failure_logged = true;
                }
            }
        }
    }

    fn notify_running_changed(&self, running: bool) {
        for observer in &self.observers {
            observer.running_changed(running);
        }
    }

    fn notify_bpm_changed(&self, bpm: f64) {
        for observer in &self.observers {
            observer.bpm_changed(bpm);
        }
    }

    fn notify_clock_tick(&self) {
        for observer in &self.observers {
            observer.clock_tick();
        }
    }

    fn notify_beat_sent(&self, quarter_note: i32) {
        for observer in &self.observers {
            observer.beat_sent(quarter_note);
        }
    }

    fn notify_position_changed(&self, beats: i32, quarter_notes: f64) {
        for observer in &self.observers {
            observer.position_changed(beats, quarter_notes);
        }
    }
}
