//! Contact bounce filtering for the hook and dial inputs.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::{
    config::Wiring,
    hardware::{Edge, Level, Pin},
};

/// A transition that survived bounce filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncedEdge {
    pub pin: Pin,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug)]
struct PinFilter {
    raw_level: Level,
    /// Start of the current run of `raw_level`.
    raw_at: Option<Instant>,
    stable_level: Level,
}

impl PinFilter {
    fn new(idle_level: Level) -> Self {
        PinFilter {
            raw_level: idle_level,
            raw_at: None,
            stable_level: idle_level,
        }
    }

    fn settle(&mut self, pin: Pin, now: Instant, window: Duration) -> Option<DebouncedEdge> {
        let raw_at = self.raw_at?;

        if self.raw_level == self.stable_level || now.saturating_duration_since(raw_at) < window {
            return None;
        }

        self.stable_level = self.raw_level;

        Some(DebouncedEdge {
            pin,
            level: self.raw_level,
            at: raw_at,
        })
    }

    fn push(&mut self, edge: &Edge) {
        if edge.level == self.raw_level {
            return;
        }

        if self.raw_level != self.stable_level {
            trace!(pin = ?edge.pin, level = ?self.raw_level, "bounce discarded");
        }

        self.raw_level = edge.level;
        self.raw_at = Some(edge.at);
    }
}

/// Per-pin debouncer.
///
/// A level is reported once the pin has held it for a full window, stamped
/// with the time the pin reached it. Anything shorter is bounce or noise and
/// is dropped without a trace downstream.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    hook: PinFilter,
    dial_pulse: PinFilter,
    dial_latch: PinFilter,
}

impl Debouncer {
    pub fn new(window: Duration, wiring: &Wiring) -> Self {
        Debouncer {
            window,
            hook: PinFilter::new(wiring.idle_level(Pin::Hook)),
            dial_pulse: PinFilter::new(wiring.idle_level(Pin::DialPulse)),
            dial_latch: PinFilter::new(wiring.idle_level(Pin::DialLatch)),
        }
    }

    fn filter_mut(&mut self, pin: Pin) -> &mut PinFilter {
        match pin {
            Pin::Hook => &mut self.hook,
            Pin::DialPulse => &mut self.dial_pulse,
            Pin::DialLatch => &mut self.dial_latch,
        }
    }

    #[cfg(test)]
    pub fn stable_level(&self, pin: Pin) -> Level {
        match pin {
            Pin::Hook => self.hook.stable_level,
            Pin::DialPulse => self.dial_pulse.stable_level,
            Pin::DialLatch => self.dial_latch.stable_level,
        }
    }

    /// Reports pins that have held a new level for a full window by `now`,
    /// oldest first.
    pub fn settle(&mut self, now: Instant) -> Vec<DebouncedEdge> {
        let window = self.window;

        let mut settled: Vec<DebouncedEdge> = [Pin::Hook, Pin::DialPulse, Pin::DialLatch]
            .into_iter()
            .filter_map(|pin| self.filter_mut(pin).settle(pin, now, window))
            .collect();

        settled.sort_by_key(|edge| edge.at);
        settled
    }

    /// Feeds one raw edge. Returns the pins that settled before it arrived.
    pub fn push(&mut self, edge: Edge) -> Vec<DebouncedEdge> {
        let settled = self.settle(edge.at);
        self.filter_mut(edge.pin).push(&edge);
        settled
    }
}
