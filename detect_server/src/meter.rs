use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of processed work, reset whenever they are logged.
#[derive(Default)]
pub struct Meter {
    received_frames: AtomicU64,
    detected_frames: AtomicU64,
    dropped_frames: AtomicU64,
    predictions: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            received_frames: AtomicU64::new(0),
            detected_frames: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
        }
    }

    pub fn tick_received(&self) {
        self.received_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_detected(&self) {
        self.detected_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Take `(received, detected, dropped, predictions)` and reset all counters.
    pub fn take(&self) -> (u64, u64, u64, u64) {
        (
            self.received_frames.swap(0, Ordering::Relaxed),
            self.detected_frames.swap(0, Ordering::Relaxed),
            self.dropped_frames.swap(0, Ordering::Relaxed),
            self.predictions.swap(0, Ordering::Relaxed),
        )
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let (received, detected, dropped, predictions) = METER.take();
            let elapsed = start.elapsed().as_secs_f32();

            if received > 0 {
                log::info!("Received frames per second: {:.2}", received as f32 / elapsed)
            }
            if detected > 0 {
                log::info!("Detected frames per second: {:.2}", detected as f32 / elapsed)
            }
            if dropped > 0 {
                log::info!("Dropped {dropped} frames while the model was busy")
            }
            if predictions > 0 {
                log::info!("Answered {predictions} questions")
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_take_resets() {
        let meter = Meter::new();
        meter.tick_received();
        meter.tick_received();
        meter.tick_detected();
        meter.tick_prediction();

        assert_eq!(meter.take(), (2, 1, 0, 1));
        assert_eq!(meter.take(), (0, 0, 0, 0));
    }
}
