//! Phone state machine
//!
//! Turns hook and dial events into phone states and playback commands. A
//! replaced handset wins over everything else.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::events::{Command, DialedNumber, PhoneEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhoneState {
    /// Handset on the cradle
    #[default]
    OnHook,
    /// Handset lifted, nothing dialed yet
    OffHookIdle,
    /// Pulses of a digit are arriving
    Dialing,
    /// Between digits
    DigitPause,
    /// Number handed to playback, waiting for it to start
    NumberComplete,
    /// A clip is playing for the caller
    Playing,
}

impl PhoneState {
    /// Whether dial pulses should be decoded in this state.
    pub fn accepts_dialing(self) -> bool {
        matches!(
            self,
            PhoneState::OffHookIdle | PhoneState::Dialing | PhoneState::DigitPause
        )
    }
}

impl std::fmt::Display for PhoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhoneState::OnHook => write!(f, "OnHook"),
            PhoneState::OffHookIdle => write!(f, "OffHookIdle"),
            PhoneState::Dialing => write!(f, "Dialing"),
            PhoneState::DigitPause => write!(f, "DigitPause"),
            PhoneState::NumberComplete => write!(f, "NumberComplete"),
            PhoneState::Playing => write!(f, "Playing"),
        }
    }
}

pub struct DialStateMachine {
    state: PhoneState,
    number: DialedNumber,
    end_of_dialing: Duration,
    last_digit_at: Option<Instant>,

    ring_on_hook: bool,
    answer_on_pickup: bool,
    ringing: bool,
    answering: bool,
}

impl DialStateMachine {
    pub fn new(end_of_dialing: Duration) -> Self {
        Self {
            state: PhoneState::OnHook,
            number: DialedNumber::new(),
            end_of_dialing,
            last_digit_at: None,

            ring_on_hook: false,
            answer_on_pickup: false,
            ringing: false,
            answering: false,
        }
    }

    /// Ring the bell whenever the handset is down. With `answer_on_pickup`,
    /// lifting the handset plays the answer clip instead of a dial tone.
    pub fn with_ringing(mut self, answer_on_pickup: bool) -> Self {
        self.ring_on_hook = true;
        self.answer_on_pickup = answer_on_pickup;
        self
    }

    pub fn state(&self) -> PhoneState {
        self.state
    }

    pub fn number(&self) -> &DialedNumber {
        &self.number
    }

    #[cfg(test)]
    pub fn is_ringing(&self) -> bool {
        self.ringing
    }

    /// Commands for entering the initial on-hook state.
    pub fn start(&mut self) -> Vec<Command> {
        info!("phone started on hook");
        self.start_ringing()
    }

    pub fn handle(&mut self, event: PhoneEvent) -> Vec<Command> {
        match (self.state, event) {
            (PhoneState::OnHook, PhoneEvent::HookReplaced) => Vec::new(),
            (_, PhoneEvent::HookReplaced) => self.hang_up(),

            (PhoneState::OnHook, PhoneEvent::HookLifted) => self.pick_up(),

            (PhoneState::OffHookIdle, PhoneEvent::DialStarted) => {
                self.transition_to(PhoneState::Dialing);
                self.answering = false;
                vec![Command::StopAudio]
            }
            (PhoneState::DigitPause, PhoneEvent::DialStarted) => {
                self.transition_to(PhoneState::Dialing);
                Vec::new()
            }

            (PhoneState::Dialing, PhoneEvent::Digit(digit, at)) => {
                self.number.push(digit);
                self.last_digit_at = Some(at);
                debug!(%digit, number = %self.number, "digit appended");
                self.transition_to(PhoneState::DigitPause);
                Vec::new()
            }

            (PhoneState::Dialing | PhoneState::DigitPause, PhoneEvent::DecodeFailed(e)) => {
                warn!(error = %e, partial = %self.number, "dialing discarded");
                self.reset_to_idle();
                Vec::new()
            }

            (PhoneState::DigitPause, PhoneEvent::Tick(now)) => match self.last_digit_at {
                Some(at) if now.saturating_duration_since(at) >= self.end_of_dialing => {
                    self.complete()
                }
                _ => Vec::new(),
            },
            (PhoneState::DigitPause, PhoneEvent::DialingComplete) => self.complete(),

            (PhoneState::NumberComplete, PhoneEvent::PlaybackStarted) => {
                self.transition_to(PhoneState::Playing);
                Vec::new()
            }
            (PhoneState::OffHookIdle, PhoneEvent::PlaybackStarted) if self.answering => {
                self.answering = false;
                self.transition_to(PhoneState::Playing);
                Vec::new()
            }

            (PhoneState::NumberComplete, PhoneEvent::PlaybackFailed) => {
                warn!("playback failed, returning to idle");
                self.reset_to_idle();
                Vec::new()
            }
            (PhoneState::OffHookIdle, PhoneEvent::PlaybackFailed) if self.answering => {
                warn!("answer playback failed, returning to idle");
                self.answering = false;
                Vec::new()
            }

            (PhoneState::Playing, PhoneEvent::ClipFinished) => {
                self.reset_to_idle();
                Vec::new()
            }

            (state, event) => {
                if !matches!(event, PhoneEvent::Tick(_)) {
                    debug!(%state, ?event, "event ignored");
                }
                Vec::new()
            }
        }
    }

    fn hang_up(&mut self) -> Vec<Command> {
        if !self.number.is_empty() {
            debug!(partial = %self.number, "number discarded on hang-up");
        }
        self.number.clear();
        self.last_digit_at = None;
        self.answering = false;
        self.transition_to(PhoneState::OnHook);

        let mut commands = vec![Command::StopAudio];
        commands.extend(self.start_ringing());
        commands
    }

    fn pick_up(&mut self) -> Vec<Command> {
        self.number.clear();
        self.last_digit_at = None;
        self.transition_to(PhoneState::OffHookIdle);

        let mut commands = Vec::new();

        if self.ringing {
            self.ringing = false;
            commands.push(Command::Bell(false));

            if self.answer_on_pickup {
                info!("call answered");
                self.answering = true;
                commands.push(Command::PlayAnswer);
                return commands;
            }
        }

        commands.push(Command::PlayDialTone);
        commands
    }

    fn start_ringing(&mut self) -> Vec<Command> {
        if !self.ring_on_hook {
            return Vec::new();
        }

        self.ringing = true;
        vec![Command::Bell(true), Command::PlayRing]
    }

    fn complete(&mut self) -> Vec<Command> {
        self.transition_to(PhoneState::NumberComplete);
        self.last_digit_at = None;

        let number = std::mem::take(&mut self.number);
        info!(%number, "number complete");

        vec![Command::PlayNumber(number)]
    }

    fn reset_to_idle(&mut self) {
        self.number.clear();
        self.last_digit_at = None;
        self.transition_to(PhoneState::OffHookIdle);
    }

    fn transition_to(&mut self, new_state: PhoneState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        info!(from = %old_state, to = %new_state, "state transition");

        self.state = new_state;
    }
}
