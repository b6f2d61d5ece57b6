use std::{f32::consts::TAU, time::Duration};

use rodio::Source;

use crate::config::SAMPLE_RATE;

const AMPLITUDE: f32 = 0.25;

/// Call progress tones of the North American precise tone plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneKind {
    DialTone,
    Busy,
    Ring,
}

impl ToneKind {
    fn frequencies(self) -> (f32, f32) {
        match self {
            ToneKind::DialTone => (350.0, 440.0),
            ToneKind::Busy => (480.0, 620.0),
            ToneKind::Ring => (440.0, 480.0),
        }
    }

    /// On and off time in milliseconds, `None` for a continuous tone.
    fn cadence(self) -> Option<(u64, u64)> {
        match self {
            ToneKind::DialTone => None,
            ToneKind::Busy => Some((500, 500)),
            ToneKind::Ring => Some((2000, 4000)),
        }
    }
}

/// Endless mono generator for a [`ToneKind`].
pub struct Tone {
    low: f32,
    high: f32,
    on_samples: u64,
    period_samples: u64,
    position: u64,
}

impl Tone {
    pub fn new(kind: ToneKind) -> Self {
        let (low, high) = kind.frequencies();
        let samples_per_ms = SAMPLE_RATE as u64 / 1000;

        let (on_samples, period_samples) = match kind.cadence() {
            Some((on, off)) => (on * samples_per_ms, (on + off) * samples_per_ms),
            // Whole seconds keep integer frequencies phase continuous on wrap.
            None => (SAMPLE_RATE as u64, SAMPLE_RATE as u64),
        };

        Tone {
            low,
            high,
            on_samples,
            period_samples,
            position: 0,
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let position = self.position;
        self.position = (self.position + 1) % self.period_samples;

        if position >= self.on_samples {
            return Some(0.0);
        }

        let t = (position % SAMPLE_RATE as u64) as f32 / SAMPLE_RATE as f32;
        let sample = ((TAU * self.low * t).sin() + (TAU * self.high * t).sin()) / 2.0;

        Some(sample * AMPLITUDE)
    }
}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples_for(ms: u64) -> usize {
        (SAMPLE_RATE as u64 * ms / 1000) as usize
    }

    #[test]
    fn dial_tone_never_pauses() {
        let tone = Tone::new(ToneKind::DialTone);

        let loud = tone
            .take(samples_for(3000))
            .collect::<Vec<_>>()
            .chunks(samples_for(10))
            .filter(|chunk| chunk.iter().any(|sample| sample.abs() > 0.01))
            .count();

        assert_eq!(loud, 300);
    }

    #[test]
    fn busy_alternates_half_seconds() {
        let samples: Vec<f32> = Tone::new(ToneKind::Busy).take(samples_for(2000)).collect();

        let energy = |from: u64, to: u64| -> f32 {
            samples[samples_for(from)..samples_for(to)]
                .iter()
                .map(|sample| sample.abs())
                .sum()
        };

        assert!(energy(0, 500) > 1.0);
        assert_eq!(energy(500, 1000), 0.0);
        assert!(energy(1000, 1500) > 1.0);
        assert_eq!(energy(1500, 2000), 0.0);
    }

    #[test]
    fn samples_stay_in_range() {
        for kind in [ToneKind::DialTone, ToneKind::Busy, ToneKind::Ring] {
            let tone = Tone::new(kind);
            assert_eq!(tone.channels(), 1);
            assert_eq!(tone.sample_rate(), SAMPLE_RATE);
            assert!(tone.take(samples_for(100)).all(|sample| sample.abs() <= AMPLITUDE));
        }
    }
}
