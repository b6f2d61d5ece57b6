use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::hardware::{Level, Pin};

#[cfg(feature = "real")]
pub const HOOK_SWITCH_PIN: u8 = 17;

#[cfg(feature = "real")]
pub const DIAL_LATCH_PIN: u8 = 22;
#[cfg(feature = "real")]
pub const DIAL_PULSE_PIN: u8 = 27;

#[cfg(feature = "real")]
pub const BELL_SOLENOID_FORWARD_PIN: u8 = 24;
#[cfg(feature = "real")]
pub const BELL_SOLENOID_REVERSE_PIN: u8 = 23;

pub const SAMPLE_RATE: u32 = 48000;

pub const GPIO_READ_INTERVAL: Duration = Duration::from_millis(1);
pub const DISPATCH_TICK: Duration = Duration::from_millis(2);

pub const BELL_TOGGLE_INTERVAL: Duration = Duration::from_millis(50);
pub const RING_DURATION: Duration = Duration::from_millis(1600);

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(10);
pub const DEFAULT_INTER_DIGIT: Duration = Duration::from_millis(300);
pub const DEFAULT_END_OF_DIALING: Duration = Duration::from_millis(3000);

pub const DEFAULT_MANIFEST: &str = "sounds/manifest.json";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("timings must satisfy debounce < inter-digit < end-of-dialing ({debounce:?}, {inter_digit:?}, {end_of_dialing:?})")]
    Timing {
        debounce: Duration,
        inter_digit: Duration,
        end_of_dialing: Duration,
    },
}

/// Decode thresholds. They depend on the mechanics of the individual dial, so
/// they are tuned per phone rather than fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub debounce: Duration,
    pub inter_digit: Duration,
    pub end_of_dialing: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            debounce: DEFAULT_DEBOUNCE,
            inter_digit: DEFAULT_INTER_DIGIT,
            end_of_dialing: DEFAULT_END_OF_DIALING,
        }
    }
}

/// How the contacts are wired, expressed as contact levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wiring {
    /// Hook contact level while the handset is lifted.
    pub off_hook_level: Level,
    /// Pulse contact level counted as one pulse.
    pub pulse_level: Level,
    /// Off-normal contact level while the dial is wound, if that contact is wired.
    pub latch_level: Option<Level>,
    /// Inputs use pull-up resistors, so a closed contact reads low.
    pub pull_up: bool,
}

impl Default for Wiring {
    fn default() -> Self {
        Wiring {
            off_hook_level: Level::Closed,
            pulse_level: Level::Open,
            latch_level: None,
            pull_up: true,
        }
    }
}

impl Wiring {
    pub fn idle_level(&self, pin: Pin) -> Level {
        match pin {
            Pin::Hook => !self.off_hook_level,
            Pin::DialPulse => !self.pulse_level,
            Pin::DialLatch => self.latch_level.map(|level| !level).unwrap_or(Level::Open),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub timing: Timing,
    pub wiring: Wiring,
    pub manifest: PathBuf,
    pub audio_device: Option<String>,
    pub ring_on_hook: bool,
    pub early_complete: bool,
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timing: Timing::default(),
            wiring: Wiring::default(),
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            audio_device: None,
            ring_on_hook: false,
            early_complete: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Reads `PHONE_*` variables from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let timing = Timing {
            debounce: millis(&lookup, "PHONE_DEBOUNCE_MS")?.unwrap_or(defaults.timing.debounce),
            inter_digit: millis(&lookup, "PHONE_INTER_DIGIT_MS")?
                .unwrap_or(defaults.timing.inter_digit),
            end_of_dialing: millis(&lookup, "PHONE_END_OF_DIALING_MS")?
                .unwrap_or(defaults.timing.end_of_dialing),
        };

        if timing.debounce >= timing.inter_digit || timing.inter_digit >= timing.end_of_dialing {
            return Err(ConfigError::Timing {
                debounce: timing.debounce,
                inter_digit: timing.inter_digit,
                end_of_dialing: timing.end_of_dialing,
            });
        }

        let latch_level = match lookup("PHONE_DIAL_LATCH") {
            None => defaults.wiring.latch_level,
            Some(value) if value.eq_ignore_ascii_case("none") => None,
            Some(value) => Some(value.parse::<Level>().map_err(|_| ConfigError::Invalid {
                key: "PHONE_DIAL_LATCH",
                value,
            })?),
        };

        let pull_up = match lookup("PHONE_INPUT_PULL") {
            None => defaults.wiring.pull_up,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "up" => true,
                "down" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PHONE_INPUT_PULL",
                        value,
                    })
                }
            },
        };

        let wiring = Wiring {
            off_hook_level: level(&lookup, "PHONE_OFF_HOOK_LEVEL")?
                .unwrap_or(defaults.wiring.off_hook_level),
            pulse_level: level(&lookup, "PHONE_PULSE_LEVEL")?.unwrap_or(defaults.wiring.pulse_level),
            latch_level,
            pull_up,
        };

        let queue_capacity = match lookup("PHONE_QUEUE_CAPACITY") {
            None => defaults.queue_capacity,
            Some(value) => match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PHONE_QUEUE_CAPACITY",
                        value,
                    })
                }
            },
        };

        Ok(Config {
            timing,
            wiring,
            manifest: lookup("PHONE_MANIFEST")
                .map(PathBuf::from)
                .unwrap_or(defaults.manifest),
            audio_device: lookup("PHONE_AUDIO_DEVICE").filter(|name| !name.is_empty()),
            ring_on_hook: flag(&lookup, "PHONE_RING_ON_HOOK")?.unwrap_or(defaults.ring_on_hook),
            early_complete: flag(&lookup, "PHONE_EARLY_COMPLETE")?
                .unwrap_or(defaults.early_complete),
            queue_capacity,
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

fn level(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Level>, ConfigError> {
    lookup(key)
        .map(|value| value.parse().map_err(|_| ConfigError::Invalid { key, value }))
        .transpose()
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    lookup(key)
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();

        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.wiring, Wiring::default());
        assert_eq!(config.manifest, PathBuf::from(DEFAULT_MANIFEST));
        assert!(!config.ring_on_hook);
        assert!(!config.early_complete);
    }

    #[test]
    fn overrides_from_environment() {
        let config = load(&[
            ("PHONE_DEBOUNCE_MS", "15"),
            ("PHONE_INTER_DIGIT_MS", "350"),
            ("PHONE_END_OF_DIALING_MS", "2500"),
            ("PHONE_OFF_HOOK_LEVEL", "open"),
            ("PHONE_DIAL_LATCH", "Closed"),
            ("PHONE_INPUT_PULL", "down"),
            ("PHONE_RING_ON_HOOK", "true"),
            ("PHONE_AUDIO_DEVICE", "Headphones"),
        ])
        .unwrap();

        assert_eq!(config.timing.debounce, Duration::from_millis(15));
        assert_eq!(config.timing.inter_digit, Duration::from_millis(350));
        assert_eq!(config.timing.end_of_dialing, Duration::from_millis(2500));
        assert_eq!(config.wiring.off_hook_level, Level::Open);
        assert_eq!(config.wiring.latch_level, Some(Level::Closed));
        assert!(!config.wiring.pull_up);
        assert!(config.ring_on_hook);
        assert_eq!(config.audio_device.as_deref(), Some("Headphones"));
    }

    #[test]
    fn rejects_inverted_timings() {
        let result = load(&[("PHONE_INTER_DIGIT_MS", "5000")]);
        assert!(matches!(result, Err(ConfigError::Timing { .. })));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            load(&[("PHONE_DEBOUNCE_MS", "fast")]),
            Err(ConfigError::Invalid { key: "PHONE_DEBOUNCE_MS", .. })
        ));
        assert!(matches!(
            load(&[("PHONE_PULSE_LEVEL", "sideways")]),
            Err(ConfigError::Invalid { key: "PHONE_PULSE_LEVEL", .. })
        ));
        assert!(matches!(
            load(&[("PHONE_EARLY_COMPLETE", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn idle_levels_follow_wiring() {
        let wiring = Wiring {
            latch_level: Some(Level::Closed),
            ..Wiring::default()
        };

        assert_eq!(wiring.idle_level(Pin::Hook), Level::Open);
        assert_eq!(wiring.idle_level(Pin::DialPulse), Level::Closed);
        assert_eq!(wiring.idle_level(Pin::DialLatch), Level::Open);
    }
}
