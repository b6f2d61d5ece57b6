pub mod audio;
pub mod bell;
#[cfg(not(feature = "real"))]
pub mod emulated;
#[cfg(feature = "real")]
pub mod physical;
pub mod tone;

use std::{
    ops::Not,
    str::FromStr,
    sync::mpsc::{Receiver, SyncSender, TryRecvError},
    thread,
    time::Instant,
};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{Config, GPIO_READ_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    Hook,
    DialPulse,
    /// The dial's off-normal contact, engaged while the dial is away from rest.
    DialLatch,
}

/// Contact level, independent of how the input pin is pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Open,
    Closed,
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Open => Level::Closed,
            Level::Closed => Level::Open,
        }
    }
}

impl FromStr for Level {
    type Err = ();

    fn from_str(input: &str) -> Result<Level, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Level::Open),
            "closed" => Ok(Level::Closed),
            _ => Err(()),
        }
    }
}

/// A raw level change as sampled from a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub pin: Pin,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("hardware signal feed disconnected")]
    FeedDisconnected,
    #[cfg(feature = "real")]
    #[error("gpio: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

pub trait PhoneHardware {
    fn create(config: &Config) -> Result<Self, HardwareError>
    where
        Self: Sized;

    /// Samples the inputs and appends every level change seen since the last
    /// call to `edges`, in the order they happened.
    fn update(&mut self, now: Instant, edges: &mut Vec<Edge>) -> Result<(), HardwareError>;

    fn ring(&mut self, enabled: bool);
}

/// Drives `hardware` until shutdown, forwarding edges to the dispatcher.
///
/// Returning drops `edges`, which the dispatcher treats as the feed going away.
pub fn run_sampler<H: PhoneHardware>(
    mut hardware: H,
    edges: SyncSender<Edge>,
    bell: Receiver<bool>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), HardwareError> {
    info!("sampler started");

    let mut batch = Vec::new();

    loop {
        if *shutdown.borrow() {
            hardware.ring(false);
            info!("sampler stopped");
            return Ok(());
        }

        loop {
            match bell.try_recv() {
                Ok(enabled) => hardware.ring(enabled),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if let Err(e) = hardware.update(Instant::now(), &mut batch) {
            error!(error = %e, "sampler failed");
            hardware.ring(false);
            return Err(e);
        }

        for edge in batch.drain(..) {
            // Blocks when the queue is full rather than dropping edges.
            if edges.send(edge).is_err() {
                debug!("dispatcher gone, sampler exiting");
                hardware.ring(false);
                return Ok(());
            }
        }

        thread::sleep(GPIO_READ_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc::{channel, sync_channel},
        time::Duration,
    };

    use super::*;

    struct Scripted {
        pending: Vec<Edge>,
        fail_after: usize,
        updates: usize,
        ringing: bool,
    }

    impl PhoneHardware for Scripted {
        fn create(_config: &Config) -> Result<Self, HardwareError> {
            Ok(Scripted {
                pending: Vec::new(),
                fail_after: usize::MAX,
                updates: 0,
                ringing: false,
            })
        }

        fn update(&mut self, _now: Instant, edges: &mut Vec<Edge>) -> Result<(), HardwareError> {
            self.updates += 1;
            if self.updates > self.fail_after {
                return Err(HardwareError::FeedDisconnected);
            }
            edges.append(&mut self.pending);
            Ok(())
        }

        fn ring(&mut self, enabled: bool) {
            self.ringing = enabled;
        }
    }

    #[test]
    fn level_parses_and_inverts() {
        assert_eq!("Closed".parse::<Level>(), Ok(Level::Closed));
        assert_eq!(" open ".parse::<Level>(), Ok(Level::Open));
        assert!("high".parse::<Level>().is_err());
        assert_eq!(!Level::Open, Level::Closed);
    }

    #[test]
    fn sampler_forwards_edges_then_reports_failure() {
        let mut hardware = Scripted::create(&Config::default()).unwrap();
        let at = Instant::now();
        hardware.pending = vec![
            Edge { pin: Pin::Hook, level: Level::Closed, at },
            Edge { pin: Pin::DialPulse, level: Level::Open, at: at + Duration::from_millis(5) },
        ];
        hardware.fail_after = 2;

        let (edge_tx, edge_rx) = sync_channel(8);
        let (_bell_tx, bell_rx) = channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = run_sampler(hardware, edge_tx, bell_rx, shutdown_rx);

        assert!(matches!(result, Err(HardwareError::FeedDisconnected)));
        let received: Vec<Edge> = edge_rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].pin, Pin::Hook);
        assert_eq!(received[1].pin, Pin::DialPulse);
    }

    #[test]
    fn sampler_stops_on_shutdown() {
        let hardware = Scripted::create(&Config::default()).unwrap();
        let (edge_tx, _edge_rx) = sync_channel(8);
        let (_bell_tx, bell_rx) = channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        assert!(run_sampler(hardware, edge_tx, bell_rx, shutdown_rx).is_ok());
    }
}
