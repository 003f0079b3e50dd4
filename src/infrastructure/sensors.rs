//! Sensor sources feeding the sampling worker.

use crate::domain::models::{RawSample, SensorKind, Vector3};
use crate::domain::monitor::SensorSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sample period of the generator thread; tens of Hz, matching the "UI"
/// sensor delay class of the handset platform.
const SAMPLE_PERIOD: Duration = Duration::from_millis(20);

/// A deterministic stand-in for the handset's IMU: slow sinusoidal tilt on
/// both horizontal axes plus matching angular rates, generated on its own
/// thread. Used by the demo binary; real deployments plug in a platform
/// source behind the same trait.
pub struct SyntheticSensorSource {
    shared: Arc<SharedState>,
    generator: Option<JoinHandle<()>>,
}

struct SharedState {
    listeners: Mutex<HashMap<SensorKind, mpsc::UnboundedSender<RawSample>>>,
    running: AtomicBool,
}

impl SyntheticSensorSource {
    pub fn spawn() -> Self {
        let shared = Arc::new(SharedState {
            listeners: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        });

        let state = Arc::clone(&shared);
        let generator = std::thread::Builder::new()
            .name("synthetic-sensors".to_string())
            .spawn(move || {
                info!("synthetic sensor generator running");
                let started = Instant::now();
                while state.running.load(Ordering::Relaxed) {
                    let elapsed = started.elapsed();
                    let t = elapsed.as_secs_f32();
                    let timestamp_ns = elapsed.as_nanos() as i64;

                    // Tilt swings of ~0.4 g peak, slow enough that the
                    // low-pass filter tracks gravity.
                    let accel = Vector3::new(
                        4.0 * (0.40 * t).sin(),
                        4.0 * (0.25 * t).sin(),
                        9.81,
                    );
                    let gyro = Vector3::new(
                        0.3 * (0.40 * t).cos(),
                        0.3 * (0.25 * t).cos(),
                        0.1 * (0.10 * t).sin(),
                    );

                    state.publish(SensorKind::Accelerometer, accel, timestamp_ns);
                    state.publish(SensorKind::Gyroscope, gyro, timestamp_ns);
                    std::thread::sleep(SAMPLE_PERIOD);
                }
                debug!("synthetic sensor generator exiting");
            })
            .expect("Failed to spawn synthetic sensor thread");

        Self {
            shared,
            generator: Some(generator),
        }
    }
}

impl SharedState {
    fn publish(&self, kind: SensorKind, vector: Vector3, timestamp_ns: i64) {
        if let Some(tx) = self.listeners.lock().unwrap().get(&kind) {
            // A closed listener is a stale subscription; the worker that
            // owned it unregisters on its way out.
            let _ = tx.send(RawSample {
                kind,
                vector,
                timestamp_ns,
            });
        }
    }
}

impl SensorSource for SyntheticSensorSource {
    fn subscribe(&self, kind: SensorKind, listener: mpsc::UnboundedSender<RawSample>) {
        self.shared.listeners.lock().unwrap().insert(kind, listener);
    }

    fn unsubscribe(&self, kind: SensorKind) {
        self.shared.listeners.lock().unwrap().remove(&kind);
    }
}

impl Drop for SyntheticSensorSource {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribed_stream_produces_samples() {
        let source = SyntheticSensorSource::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.subscribe(SensorKind::Accelerometer, tx);

        std::thread::sleep(Duration::from_millis(150));
        let sample = rx.try_recv().expect("no accel samples");
        assert_eq!(sample.kind, SensorKind::Accelerometer);
        assert!(sample.vector.is_finite());
    }

    #[test]
    fn test_unsubscribe_stops_stream() {
        let source = SyntheticSensorSource::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.subscribe(SensorKind::Gyroscope, tx);
        std::thread::sleep(Duration::from_millis(100));

        source.unsubscribe(SensorKind::Gyroscope);
        // Repeated unsubscribe is a no-op.
        source.unsubscribe(SensorKind::Gyroscope);

        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let source = SyntheticSensorSource::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.subscribe(SensorKind::Gyroscope, tx);
        std::thread::sleep(Duration::from_millis(200));

        let mut last = i64::MIN;
        let mut seen = 0;
        while let Ok(sample) = rx.try_recv() {
            assert!(sample.timestamp_ns > last);
            last = sample.timestamp_ns;
            seen += 1;
        }
        assert!(seen >= 2);
    }
}
