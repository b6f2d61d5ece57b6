//! Keyboard-driven stand-in for the phone.
//!
//! Reads commands from stdin and plays them back as pin edges with realistic
//! timing, contact bounce included:
//!
//! ```text
//! lift          take the handset off the hook
//! hang          put it back
//! dial 5551234  turn the dial once per digit
//! wait 2000     pause for the given milliseconds
//! ```

use std::{
    collections::VecDeque,
    io::{self, BufRead},
    str::FromStr,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::config::{Config, Wiring};
use crate::hardware::{bell::BellDriver, Edge, HardwareError, Level, PhoneHardware, Pin};
use crate::pulse::Digit;

const BOUNCE_GAP: Duration = Duration::from_millis(1);
const SETTLE_TIME: Duration = Duration::from_millis(30);
const PULSE_BREAK: Duration = Duration::from_millis(60);
const PULSE_MAKE: Duration = Duration::from_millis(40);
const WIND_UP: Duration = Duration::from_millis(400);
const BETWEEN_DIGITS: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorCommand {
    Lift,
    Hang,
    Dial(Vec<Digit>),
    Wait(Duration),
}

impl FromStr for EmulatorCommand {
    type Err = String;

    fn from_str(input: &str) -> Result<EmulatorCommand, Self::Err> {
        let mut words = input.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        match (command.as_str(), argument) {
            ("lift", None) | ("l", None) => Ok(EmulatorCommand::Lift),
            ("hang", None) | ("h", None) => Ok(EmulatorCommand::Hang),
            ("dial", Some(digits)) | ("d", Some(digits)) => digits
                .chars()
                .map(Digit::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(EmulatorCommand::Dial)
                .map_err(|_| format!("not a number: {digits}")),
            ("wait", Some(millis)) | ("w", Some(millis)) => millis
                .parse()
                .map(|millis| EmulatorCommand::Wait(Duration::from_millis(millis)))
                .map_err(|_| format!("not a duration in milliseconds: {millis}")),
            _ => Err(format!("unknown command: {}", input.trim())),
        }
    }
}

/// Turns commands into a timeline of contact edges.
struct Timeline {
    wiring: Wiring,
    edges: VecDeque<Edge>,
    cursor: Option<Instant>,
}

impl Timeline {
    fn new(wiring: Wiring) -> Self {
        Timeline {
            wiring,
            edges: VecDeque::new(),
            cursor: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn schedule(&mut self, command: &EmulatorCommand, now: Instant) {
        let start = self.cursor.map_or(now, |cursor| cursor.max(now));
        self.cursor = Some(start);

        match command {
            EmulatorCommand::Lift => self.contact(Pin::Hook, self.wiring.off_hook_level),
            EmulatorCommand::Hang => self.contact(Pin::Hook, !self.wiring.off_hook_level),
            EmulatorCommand::Wait(duration) => self.advance(*duration),
            EmulatorCommand::Dial(digits) => {
                for digit in digits {
                    self.dial(*digit);
                }
            }
        }
    }

    fn dial(&mut self, digit: Digit) {
        let pulse_level = self.wiring.pulse_level;

        self.advance(WIND_UP);
        if let Some(latch_level) = self.wiring.latch_level {
            self.contact(Pin::DialLatch, latch_level);
        }

        for _ in 0..digit.pulses() {
            self.contact(Pin::DialPulse, pulse_level);
            self.advance(PULSE_BREAK.saturating_sub(SETTLE_TIME));
            self.contact(Pin::DialPulse, !pulse_level);
            self.advance(PULSE_MAKE.saturating_sub(SETTLE_TIME));
        }

        if let Some(latch_level) = self.wiring.latch_level {
            self.contact(Pin::DialLatch, !latch_level);
        }
        self.advance(BETWEEN_DIGITS);
    }

    /// A contact change with two bounces, then time to settle.
    fn contact(&mut self, pin: Pin, level: Level) {
        for bounce_level in [level, !level, level] {
            let at = self.cursor.unwrap_or_else(Instant::now);
            self.edges.push_back(Edge {
                pin,
                level: bounce_level,
                at,
            });
            self.advance(BOUNCE_GAP);
        }
        self.advance(SETTLE_TIME.saturating_sub(BOUNCE_GAP * 3));
    }

    fn advance(&mut self, duration: Duration) {
        let cursor = self.cursor.get_or_insert_with(Instant::now);
        *cursor += duration;
    }

    fn pop_due(&mut self, now: Instant) -> Option<Edge> {
        if self.edges.front()?.at <= now {
            self.edges.pop_front()
        } else {
            None
        }
    }
}

pub struct Hardware {
    commands: Receiver<EmulatorCommand>,
    timeline: Timeline,
    wiring: Wiring,
    started: bool,
    disconnected: bool,
    bell: BellDriver,
}

impl PhoneHardware for Hardware {
    fn create(config: &Config) -> Result<Self, HardwareError> {
        let (sender, commands) = mpsc::channel();

        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };

                if line.trim().is_empty() {
                    continue;
                }

                match line.parse::<EmulatorCommand>() {
                    Ok(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        });

        info!("emulated phone ready: lift, hang, dial <digits>, wait <ms>");

        Ok(Hardware {
            commands,
            timeline: Timeline::new(config.wiring),
            wiring: config.wiring,
            started: false,
            disconnected: false,
            bell: BellDriver::new(),
        })
    }

    fn update(&mut self, now: Instant, edges: &mut Vec<Edge>) -> Result<(), HardwareError> {
        if !self.started {
            self.started = true;
            for pin in [Pin::Hook, Pin::DialPulse, Pin::DialLatch] {
                edges.push(Edge {
                    pin,
                    level: self.wiring.idle_level(pin),
                    at: now,
                });
            }
        }

        while !self.disconnected {
            match self.commands.try_recv() {
                Ok(command) => self.timeline.schedule(&command, now),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.disconnected = true,
            }
        }

        while let Some(edge) = self.timeline.pop_due(now) {
            edges.push(edge);
        }

        self.bell.update(now);

        if self.disconnected && self.timeline.is_empty() {
            return Err(HardwareError::FeedDisconnected);
        }

        Ok(())
    }

    fn ring(&mut self, enabled: bool) {
        if enabled != self.bell.is_ringing() {
            info!("bell {}", if enabled { "ringing" } else { "silent" });
        }
        self.bell.ring(enabled, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(text: &str) -> Vec<Digit> {
        text.chars().map(|ch| Digit::try_from(ch).unwrap()).collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!("lift".parse::<EmulatorCommand>(), Ok(EmulatorCommand::Lift));
        assert_eq!("  H ".parse::<EmulatorCommand>(), Ok(EmulatorCommand::Hang));
        assert_eq!("dial 907".parse::<EmulatorCommand>(), Ok(EmulatorCommand::Dial(digits("907"))));
        assert_eq!(
            "wait 250".parse::<EmulatorCommand>(),
            Ok(EmulatorCommand::Wait(Duration::from_millis(250)))
        );
        assert!("dial 9x".parse::<EmulatorCommand>().is_err());
        assert!("wait soon".parse::<EmulatorCommand>().is_err());
        assert!("answer".parse::<EmulatorCommand>().is_err());
    }

    #[test]
    fn dial_schedules_one_pulse_per_unit() {
        let wiring = Wiring::default();
        let mut timeline = Timeline::new(wiring);
        let t0 = Instant::now();

        timeline.schedule(&EmulatorCommand::Dial(digits("30")), t0);

        let edges: Vec<Edge> = timeline.edges.iter().copied().collect();
        let pulse_edges: Vec<&Edge> = edges.iter().filter(|e| e.pin == Pin::DialPulse).collect();

        // Three edges per contact change, two changes per pulse.
        assert_eq!(pulse_edges.len(), (3 + 10) * 2 * 3);
        assert!(edges.windows(2).all(|pair| pair[0].at <= pair[1].at));
        assert!(edges.iter().all(|e| e.pin != Pin::DialLatch));
    }

    #[test]
    fn latch_brackets_each_digit_when_wired() {
        let wiring = Wiring {
            latch_level: Some(Level::Closed),
            ..Wiring::default()
        };
        let mut timeline = Timeline::new(wiring);

        timeline.schedule(&EmulatorCommand::Dial(digits("1")), Instant::now());

        let pins: Vec<Pin> = timeline.edges.iter().map(|e| e.pin).collect();
        assert_eq!(pins.first(), Some(&Pin::DialLatch));
        assert_eq!(pins.last(), Some(&Pin::DialLatch));
    }

    #[test]
    fn edges_are_released_when_due() {
        let mut timeline = Timeline::new(Wiring::default());
        let t0 = Instant::now();
        timeline.schedule(&EmulatorCommand::Wait(Duration::from_millis(100)), t0);
        timeline.schedule(&EmulatorCommand::Lift, t0);

        assert!(timeline.pop_due(t0).is_none());

        let edge = timeline.pop_due(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(edge.pin, Pin::Hook);
        assert_eq!(edge.level, Level::Closed);
    }
}
