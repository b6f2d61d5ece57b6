//! Inputs and outputs of the dial state machine.

use std::{fmt, time::Instant};

use crate::pulse::{DecodeError, Digit};

/// Digits dialed since the handset was lifted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DialedNumber(Vec<Digit>);

impl DialedNumber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, digit: Digit) {
        self.0.push(digit);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DialedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in &self.0 {
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}

impl FromIterator<Digit> for DialedNumber {
    fn from_iter<I: IntoIterator<Item = Digit>>(iter: I) -> Self {
        DialedNumber(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneEvent {
    HookLifted,
    HookReplaced,
    /// The first pulse of a digit arrived.
    DialStarted,
    Digit(Digit, Instant),
    DecodeFailed(DecodeError),
    /// The number cannot grow into another mapping, no need to wait.
    DialingComplete,
    Tick(Instant),
    PlaybackStarted,
    PlaybackFailed,
    ClipFinished,
}

/// Requests from the state machine to the playback side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StopAudio,
    PlayDialTone,
    PlayNumber(DialedNumber),
    PlayRing,
    PlayAnswer,
    Bell(bool),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StopAudio => write!(f, "STOP_AUDIO"),
            Command::PlayDialTone => write!(f, "PLAY_DIAL_TONE"),
            Command::PlayNumber(number) => write!(f, "PLAY_NUMBER ({number})"),
            Command::PlayRing => write!(f, "PLAY_RING"),
            Command::PlayAnswer => write!(f, "PLAY_ANSWER"),
            Command::Bell(enabled) => write!(f, "BELL ({})", if *enabled { "on" } else { "off" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_displays_digits_in_order() {
        let number: DialedNumber = "8675309"
            .chars()
            .map(|ch| Digit::try_from(ch).unwrap())
            .collect();

        assert_eq!(number.to_string(), "8675309");
        assert_eq!(DialedNumber::new().to_string(), "");
    }

    #[test]
    fn command_display() {
        let number: DialedNumber = [Digit::from_pulses(10).unwrap()].into_iter().collect();
        assert_eq!(Command::PlayNumber(number).to_string(), "PLAY_NUMBER (0)");
        assert_eq!(Command::Bell(true).to_string(), "BELL (on)");
    }
}
