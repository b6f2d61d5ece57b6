use std::time::Instant;

use rppal::gpio::{Gpio, InputPin, Level as PinLevel, OutputPin};
use tracing::{debug, info};

use crate::config::{
    Config, Wiring, BELL_SOLENOID_FORWARD_PIN, BELL_SOLENOID_REVERSE_PIN, DIAL_LATCH_PIN,
    DIAL_PULSE_PIN, HOOK_SWITCH_PIN,
};
use crate::hardware::{
    bell::{BellDriver, BellSignal},
    Edge, HardwareError, Level, PhoneHardware, Pin,
};

struct SampledInput {
    pin: Pin,
    input: InputPin,
    last_level: Option<Level>,
}

pub struct Hardware {
    wiring: Wiring,

    inputs: Vec<SampledInput>,

    bell_solenoid_forward: OutputPin,
    bell_solenoid_reverse: OutputPin,
    bell: BellDriver,
}

impl Hardware {
    fn input(gpio: &Gpio, number: u8, pull_up: bool) -> Result<InputPin, HardwareError> {
        let pin = gpio.get(number)?;

        Ok(if pull_up {
            pin.into_input_pullup()
        } else {
            pin.into_input_pulldown()
        })
    }

    fn contact_level(&self, level: PinLevel) -> Level {
        // With a pull-up a closed contact pulls the pin to ground.
        match (self.wiring.pull_up, level) {
            (true, PinLevel::Low) | (false, PinLevel::High) => Level::Closed,
            _ => Level::Open,
        }
    }
}

impl PhoneHardware for Hardware {
    fn create(config: &Config) -> Result<Self, HardwareError> {
        let gpio = Gpio::new()?;
        let wiring = config.wiring;

        let mut inputs = vec![
            SampledInput {
                pin: Pin::Hook,
                input: Self::input(&gpio, HOOK_SWITCH_PIN, wiring.pull_up)?,
                last_level: None,
            },
            SampledInput {
                pin: Pin::DialPulse,
                input: Self::input(&gpio, DIAL_PULSE_PIN, wiring.pull_up)?,
                last_level: None,
            },
        ];

        if wiring.latch_level.is_some() {
            inputs.push(SampledInput {
                pin: Pin::DialLatch,
                input: Self::input(&gpio, DIAL_LATCH_PIN, wiring.pull_up)?,
                last_level: None,
            });
        }

        let bell_solenoid_forward = gpio.get(BELL_SOLENOID_FORWARD_PIN)?.into_output_low();
        let bell_solenoid_reverse = gpio.get(BELL_SOLENOID_REVERSE_PIN)?.into_output_low();

        info!(inputs = inputs.len(), pull_up = wiring.pull_up, "gpio ready");

        Ok(Hardware {
            wiring,
            inputs,
            bell_solenoid_forward,
            bell_solenoid_reverse,
            bell: BellDriver::new(),
        })
    }

    fn update(&mut self, now: Instant, edges: &mut Vec<Edge>) -> Result<(), HardwareError> {
        for index in 0..self.inputs.len() {
            let level = self.contact_level(self.inputs[index].input.read());
            let sampled = &mut self.inputs[index];

            if sampled.last_level != Some(level) {
                sampled.last_level = Some(level);
                edges.push(Edge {
                    pin: sampled.pin,
                    level,
                    at: now,
                });
            }
        }

        if let Some(signal) = self.bell.update(now) {
            match signal {
                BellSignal::Forward => {
                    self.bell_solenoid_reverse.set_low();
                    self.bell_solenoid_forward.set_high();
                }
                BellSignal::Reverse => {
                    self.bell_solenoid_forward.set_low();
                    self.bell_solenoid_reverse.set_high();
                }
                BellSignal::Off => {
                    self.bell_solenoid_forward.set_low();
                    self.bell_solenoid_reverse.set_low();
                }
            }
        }

        Ok(())
    }

    fn ring(&mut self, enabled: bool) {
        if enabled != self.bell.is_ringing() {
            debug!(enabled, "bell");
        }
        self.bell.ring(enabled, Instant::now());
    }
}
