use std::time::{Duration, Instant};

use crate::config::{BELL_TOGGLE_INTERVAL, RING_DURATION};

/// Drive applied to the bell solenoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BellSignal {
    Off,
    Forward,
    Reverse,
}

/// Ring cadence: the solenoid flips every toggle interval for one ring
/// duration, then rests for the same duration.
pub struct BellDriver {
    ringing_since: Option<Instant>,
    signal: BellSignal,
}

impl BellDriver {
    pub fn new() -> Self {
        BellDriver {
            ringing_since: None,
            signal: BellSignal::Off,
        }
    }

    pub fn ring(&mut self, enabled: bool, now: Instant) {
        match (enabled, self.ringing_since) {
            (true, None) => self.ringing_since = Some(now),
            (false, Some(_)) => self.ringing_since = None,
            _ => {}
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing_since.is_some()
    }

    /// Returns the new signal when it changed since the last call.
    pub fn update(&mut self, now: Instant) -> Option<BellSignal> {
        let target = match self.ringing_since {
            None => BellSignal::Off,
            Some(since) => Self::signal_at(now.saturating_duration_since(since)),
        };

        if target == self.signal {
            return None;
        }

        self.signal = target;
        Some(target)
    }

    fn signal_at(elapsed: Duration) -> BellSignal {
        let cycle = RING_DURATION.as_millis() * 2;
        let phase = elapsed.as_millis() % cycle;

        if phase >= RING_DURATION.as_millis() {
            return BellSignal::Off;
        }

        if (phase / BELL_TOGGLE_INTERVAL.as_millis()) % 2 == 0 {
            BellSignal::Forward
        } else {
            BellSignal::Reverse
        }
    }
}

impl Default for BellDriver {
    fn default() -> Self {
        Self::new()
    }
}
