//! Event bus between the hardware feed, the state machine and playback.
//!
//! Everything that mutates phone state runs here, on one thread.

use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    time::Instant,
};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use crate::{
    clips::ClipLibrary,
    config::{Config, Wiring, DISPATCH_TICK},
    debounce::{DebouncedEdge, Debouncer},
    hardware::{Edge, Pin},
    phone::{Command, DialStateMachine, PhoneEvent, PhoneState},
    playback::{AudioOutput, PlaybackController},
    pulse::{PulseDecoder, PulseEvent},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("hardware signal feed disconnected")]
    FeedDisconnected,
}

pub struct Dispatcher<O: AudioOutput> {
    debouncer: Debouncer,
    decoder: PulseDecoder,
    machine: DialStateMachine,
    playback: PlaybackController<O>,
    wiring: Wiring,
    early_complete: bool,
    bell: Sender<bool>,
}

impl<O: AudioOutput> Dispatcher<O> {
    pub fn new(config: &Config, library: ClipLibrary, output: O, bell: Sender<bool>) -> Self {
        let mut machine = DialStateMachine::new(config.timing.end_of_dialing);
        if config.ring_on_hook {
            machine = machine.with_ringing(library.answer().is_some());
        }

        Dispatcher {
            debouncer: Debouncer::new(config.timing.debounce, &config.wiring),
            decoder: PulseDecoder::new(config.timing.inter_digit, &config.wiring),
            machine,
            playback: PlaybackController::new(output, library),
            wiring: config.wiring,
            early_complete: config.early_complete,
            bell,
        }
    }

    pub fn state(&self) -> PhoneState {
        self.machine.state()
    }

    #[cfg(test)]
    pub fn number(&self) -> &crate::phone::DialedNumber {
        self.machine.number()
    }

    #[cfg(test)]
    pub fn playback(&self) -> &PlaybackController<O> {
        &self.playback
    }

    /// Runs the initial on-hook commands.
    pub fn start(&mut self) {
        let commands = self.machine.start();
        self.execute_all(commands);
        self.sync_decoder();
    }

    pub fn handle_edge(&mut self, edge: Edge) {
        trace!(pin = ?edge.pin, level = ?edge.level, "raw edge");

        for debounced in self.debouncer.push(edge) {
            self.route(debounced);
        }
    }

    /// Runs time-driven work: settled contacts, digit and dialing timeouts,
    /// and clips that ran out.
    pub fn tick(&mut self, now: Instant) {
        for debounced in self.debouncer.settle(now) {
            self.route(debounced);
        }

        if let Some(event) = self.decoder.poll(now) {
            self.on_pulse_event(event);
        }

        self.feed(PhoneEvent::Tick(now));

        if self.playback.is_playing() {
            return;
        }

        if let Some(clip) = self.playback.poll_finished() {
            info!(clip = %clip.name, "clip finished");
            self.feed(PhoneEvent::ClipFinished);
        }
    }

    /// Consumes edges until shutdown or until the feed disconnects.
    pub fn run(
        mut self,
        edges: Receiver<Edge>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), DispatchError> {
        info!("dispatcher started");
        self.start();

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            match edges.recv_timeout(DISPATCH_TICK) {
                Ok(edge) => {
                    self.handle_edge(edge);
                    // Drain the backlog so timeouts never fire ahead of queued edges.
                    while let Ok(edge) = edges.try_recv() {
                        self.handle_edge(edge);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // The sampler exits first on a normal shutdown.
                    if *shutdown.borrow() {
                        break Ok(());
                    }
                    error!("hardware feed disconnected");
                    break Err(DispatchError::FeedDisconnected);
                }
            }

            self.tick(Instant::now());
        };

        self.playback.stop();
        let _ = self.bell.send(false);
        info!(state = %self.state(), "dispatcher stopped");

        result
    }

    fn route(&mut self, edge: DebouncedEdge) {
        match edge.pin {
            Pin::Hook => {
                let event = if edge.level == self.wiring.off_hook_level {
                    PhoneEvent::HookLifted
                } else {
                    PhoneEvent::HookReplaced
                };
                self.feed(event);
            }
            Pin::DialPulse => {
                if let Some(event) = self.decoder.pulse_edge(&edge) {
                    self.on_pulse_event(event);
                }
            }
            Pin::DialLatch => {
                if let Some(event) = self.decoder.latch_edge(&edge) {
                    self.on_pulse_event(event);
                }
            }
        }
    }

    fn on_pulse_event(&mut self, event: PulseEvent) {
        match event {
            PulseEvent::Started(_) => self.feed(PhoneEvent::DialStarted),
            PulseEvent::Digit(digit, at) => {
                self.feed(PhoneEvent::Digit(digit, at));

                if self.early_complete
                    && self.machine.state() == PhoneState::DigitPause
                    && self.playback.library().is_unambiguous(self.machine.number())
                {
                    self.feed(PhoneEvent::DialingComplete);
                }
            }
            PulseEvent::Invalid(e, _) => self.feed(PhoneEvent::DecodeFailed(e)),
        }
    }

    fn feed(&mut self, event: PhoneEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            for command in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(command) {
                    pending.push_back(follow_up);
                }
            }
        }

        self.sync_decoder();
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            if let Some(follow_up) = self.execute(command) {
                self.feed(follow_up);
            }
        }
    }

    /// Carries out one command. Playback of a call clip reports back whether
    /// it started.
    fn execute(&mut self, command: Command) -> Option<PhoneEvent> {
        trace!(%command, "executing");

        match command {
            Command::StopAudio => {
                self.playback.stop();
                None
            }
            Command::PlayDialTone => {
                if let Err(e) = self.playback.play_dial_tone() {
                    warn!(error = %e, "dial tone unavailable");
                }
                None
            }
            Command::PlayRing => {
                if let Err(e) = self.playback.play_ring() {
                    warn!(error = %e, "ring unavailable");
                }
                None
            }
            Command::PlayNumber(number) => match self.playback.play_number(&number) {
                Ok(clip) => {
                    info!(%number, clip = %clip.name, "playing");
                    Some(PhoneEvent::PlaybackStarted)
                }
                Err(e) => {
                    error!(%number, error = %e, "playback failed");
                    Some(PhoneEvent::PlaybackFailed)
                }
            },
            Command::PlayAnswer => match self.playback.play_answer() {
                Ok(clip) => {
                    info!(clip = %clip.name, "answering");
                    Some(PhoneEvent::PlaybackStarted)
                }
                Err(e) => {
                    error!(error = %e, "answer playback failed");
                    Some(PhoneEvent::PlaybackFailed)
                }
            },
            Command::Bell(enabled) => {
                let _ = self.bell.send(enabled);
                None
            }
        }
    }

    fn sync_decoder(&mut self) {
        self.decoder
            .enable_dialing(self.machine.state().accepts_dialing());
    }
}
