//! Rotary dial pulse counting.

use std::{
    fmt,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::debug;

use crate::{config::Wiring, debounce::DebouncedEdge, hardware::Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid pulse count {0}, expected 1 to 10")]
    InvalidPulseCount(u32),
}

/// A single dialed digit, 0 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digit(u8);

impl Digit {
    /// One pulse per unit, with ten pulses standing for zero.
    pub fn from_pulses(count: u32) -> Result<Digit, DecodeError> {
        match count {
            1..=9 => Ok(Digit(count as u8)),
            10 => Ok(Digit(0)),
            _ => Err(DecodeError::InvalidPulseCount(count)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn pulses(self) -> u32 {
        if self.0 == 0 {
            10
        } else {
            self.0 as u32
        }
    }
}

impl TryFrom<char> for Digit {
    type Error = ();

    fn try_from(ch: char) -> Result<Digit, Self::Error> {
        ch.to_digit(10).map(|value| Digit(value as u8)).ok_or(())
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseEvent {
    /// First pulse of a new digit.
    Started(Instant),
    Digit(Digit, Instant),
    Invalid(DecodeError, Instant),
}

pub struct PulseDecoder {
    inter_digit: Duration,
    pulse_level: Level,
    latch_level: Option<Level>,

    enabled: bool,
    latch_engaged: bool,
    pulses: u32,
    last_edge: Option<Instant>,
}

impl PulseDecoder {
    pub fn new(inter_digit: Duration, wiring: &Wiring) -> Self {
        PulseDecoder {
            inter_digit,
            pulse_level: wiring.pulse_level,
            latch_level: wiring.latch_level,

            enabled: false,
            latch_engaged: false,
            pulses: 0,
            last_edge: None,
        }
    }

    pub fn enable_dialing(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "dialing toggled");
        }

        if !enabled && self.pulses() > 0 {
            debug!(pulses = self.pulses(), "partial digit dropped");
        }

        self.enabled = enabled;

        if !enabled {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.pulses = 0;
        self.last_edge = None;
    }

    pub fn pulses(&self) -> u32 {
        self.pulses
    }

    /// Feeds a debounced edge from the pulse contact.
    pub fn pulse_edge(&mut self, edge: &DebouncedEdge) -> Option<PulseEvent> {
        if !self.enabled {
            return None;
        }

        if self.latch_level.is_some() && !self.latch_engaged {
            return None;
        }

        self.last_edge = Some(edge.at);

        if edge.level != self.pulse_level {
            return None;
        }

        self.pulses += 1;

        if self.pulses == 1 {
            Some(PulseEvent::Started(edge.at))
        } else {
            None
        }
    }

    /// Feeds a debounced edge from the off-normal contact. Releasing it ends
    /// the digit.
    pub fn latch_edge(&mut self, edge: &DebouncedEdge) -> Option<PulseEvent> {
        let latch_level = self.latch_level?;

        self.latch_engaged = edge.level == latch_level;

        if !self.enabled {
            return None;
        }

        if self.latch_engaged {
            self.reset();
            None
        } else {
            Some(self.finish(edge.at))
        }
    }

    /// Ends a digit once the pulse contact has been quiet for the inter-digit
    /// timeout. Not used when the off-normal contact is wired.
    pub fn poll(&mut self, now: Instant) -> Option<PulseEvent> {
        if !self.enabled || self.latch_level.is_some() || self.pulses == 0 {
            return None;
        }

        let last_edge = self.last_edge?;

        if now.saturating_duration_since(last_edge) < self.inter_digit {
            return None;
        }

        Some(self.finish(last_edge))
    }

    fn finish(&mut self, at: Instant) -> PulseEvent {
        let pulses = self.pulses;
        self.reset();

        match Digit::from_pulses(pulses) {
            Ok(digit) => {
                debug!(pulses, %digit, "digit decoded");
                PulseEvent::Digit(digit, at)
            }
            Err(e) => PulseEvent::Invalid(e, at),
        }
    }
}
