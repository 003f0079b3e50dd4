//! Motion monitor: lifecycle wrapper around the sensor sampling worker.
//!
//! The worker is a dedicated thread running its own current-thread tokio
//! runtime. It subscribes to the accelerometer and gyroscope streams, runs
//! every sample through the signal filters, and delivers processed events to
//! the owner's sink after a per-stream pacing delay.

use crate::domain::filters::FilterState;
use crate::domain::models::{MonitorState, RawSample, SampleEvent, SensorKind};
use crate::domain::settings::Settings;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A subscribable sensor stream provider.
///
/// Subscription and unsubscription are idempotent and report no errors: a
/// missing sensor simply never produces samples. Implemented by the platform
/// layer and by test doubles.
pub trait SensorSource: Send + Sync {
    fn subscribe(&self, kind: SensorKind, listener: mpsc::UnboundedSender<RawSample>);
    fn unsubscribe(&self, kind: SensorKind);
}

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The sampling worker did not exit within the configured bound. This is
    /// an internal invariant violation, not a recoverable condition.
    #[error("sampling worker failed to stop within {0:?}")]
    WorkerStalled(Duration),
    #[error("sampling worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub low_pass_alpha: f32,
    pub gyro_epsilon: f32,
    pub accel_delivery_delay: Duration,
    pub gyro_delivery_delay: Duration,
    pub join_timeout: Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            low_pass_alpha: settings.low_pass_alpha,
            gyro_epsilon: settings.gyro_epsilon,
            accel_delivery_delay: Duration::from_millis(settings.accel_delivery_delay_ms),
            gyro_delivery_delay: Duration::from_millis(settings.gyro_delivery_delay_ms),
            join_timeout: Duration::from_millis(settings.worker_join_timeout_ms),
        }
    }
}

enum ControlMessage {
    Shutdown,
}

struct WorkerHandle {
    thread: JoinHandle<()>,
    ctrl_tx: mpsc::UnboundedSender<ControlMessage>,
    exit_rx: std::sync::mpsc::Receiver<()>,
}

pub struct MotionMonitor {
    source: Arc<dyn SensorSource>,
    sink: mpsc::UnboundedSender<SampleEvent>,
    config: MonitorConfig,
    state: Arc<Mutex<MonitorState>>,
    worker: Option<WorkerHandle>,
}

impl MotionMonitor {
    pub fn new(
        source: Arc<dyn SensorSource>,
        sink: mpsc::UnboundedSender<SampleEvent>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            state: Arc::new(Mutex::new(MonitorState::Idle)),
            worker: None,
        }
    }

    /// Spawn a fresh sampling worker with fresh filter state. If a worker is
    /// already running it is fully stopped first, so at most one worker is
    /// ever active.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.worker.is_some() {
            self.stop()?;
        }

        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = std::sync::mpsc::channel();
        let source = Arc::clone(&self.source);
        let sink = self.sink.clone();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("motion-sampler".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("Failed to create tokio runtime for sampling worker");
                rt.block_on(sampling_loop(source, sink, config, ctrl_rx));
                // Dropping the runtime above cancelled any pending delayed
                // deliveries; the exit signal is the last thing we do.
                let _ = exit_tx.send(());
            })
            .expect("Failed to spawn sampling worker thread");

        self.worker = Some(WorkerHandle {
            thread,
            ctrl_tx,
            exit_rx,
        });
        *self.state.lock().unwrap() = MonitorState::Monitoring;
        info!("motion monitor started");
        Ok(())
    }

    /// Signal the worker to shut down and wait for it to exit. Once this
    /// returns `Ok`, no further `SampleEvent` will reach the sink. A no-op
    /// when already idle.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let _ = worker.ctrl_tx.send(ControlMessage::Shutdown);

        match worker.exit_rx.recv_timeout(self.config.join_timeout) {
            Ok(()) => {
                let _ = worker.thread.join();
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The worker died without signalling a clean exit.
                *self.state.lock().unwrap() = MonitorState::Idle;
                return match worker.thread.join() {
                    Ok(()) => Ok(()),
                    Err(_) => Err(MonitorError::WorkerPanicked),
                };
            }
            Err(RecvTimeoutError::Timeout) => {
                *self.state.lock().unwrap() = MonitorState::Idle;
                return Err(MonitorError::WorkerStalled(self.config.join_timeout));
            }
        }

        *self.state.lock().unwrap() = MonitorState::Idle;
        info!("motion monitor stopped");
        Ok(())
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock().unwrap()
    }
}

impl Drop for MotionMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop sampling worker on drop: {e}");
        }
    }
}

/// The worker's event loop. Runs until a shutdown message arrives, then
/// unregisters the accelerometer and gyroscope subscriptions (in that order)
/// before the enclosing runtime is torn down.
async fn sampling_loop(
    source: Arc<dyn SensorSource>,
    sink: mpsc::UnboundedSender<SampleEvent>,
    config: MonitorConfig,
    mut ctrl_rx: mpsc::UnboundedReceiver<ControlMessage>,
) {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    source.subscribe(SensorKind::Accelerometer, raw_tx.clone());
    source.subscribe(SensorKind::Gyroscope, raw_tx);
    debug!("sampling worker subscribed to sensor streams");

    // One forwarder per stream keeps same-source delivery in FIFO order
    // while the two streams pace independently.
    let (accel_tx, accel_rx) = mpsc::unbounded_channel();
    let (gyro_tx, gyro_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_delayed(accel_rx, sink.clone()));
    tokio::spawn(forward_delayed(gyro_rx, sink));

    let mut filter = FilterState::new();

    loop {
        tokio::select! {
            // Shutdown wins over any backlog of pending samples.
            biased;
            ctrl = ctrl_rx.recv() => match ctrl {
                Some(ControlMessage::Shutdown) | None => break,
            },
            raw = raw_rx.recv() => match raw {
                Some(sample) => handle_sample(
                    sample, &mut filter, &config, &accel_tx, &gyro_tx,
                ),
                // Both listener senders dropped: the source tore us down.
                None => break,
            },
        }
    }

    source.unsubscribe(SensorKind::Accelerometer);
    source.unsubscribe(SensorKind::Gyroscope);
    debug!("sampling worker exiting");
}

fn handle_sample(
    sample: RawSample,
    filter: &mut FilterState,
    config: &MonitorConfig,
    accel_tx: &mpsc::UnboundedSender<(Instant, SampleEvent)>,
    gyro_tx: &mpsc::UnboundedSender<(Instant, SampleEvent)>,
) {
    match sample.kind {
        SensorKind::Accelerometer => {
            let vector = filter.apply_accel(sample.vector, config.low_pass_alpha);
            let deadline = Instant::now() + config.accel_delivery_delay;
            let _ = accel_tx.send((deadline, SampleEvent::Accel { vector }));
        }
        SensorKind::Gyroscope => {
            // The first gyro sample only seeds the integration timestamp.
            if let Some(vector) =
                filter.apply_gyro(sample.vector, sample.timestamp_ns, config.gyro_epsilon)
            {
                let deadline = Instant::now() + config.gyro_delivery_delay;
                let _ = gyro_tx.send((
                    deadline,
                    SampleEvent::Gyro {
                        vector,
                        timestamp_ns: sample.timestamp_ns,
                    },
                ));
            }
        }
    }
}

/// Deliver queued events once their deadline passes. Deadlines within one
/// stream are monotonic as long as the delay constant is, so order is
/// preserved. Events still queued when the worker's runtime drops are
/// discarded.
async fn forward_delayed(
    mut rx: mpsc::UnboundedReceiver<(Instant, SampleEvent)>,
    sink: mpsc::UnboundedSender<SampleEvent>,
) {
    while let Some((deadline, event)) = rx.recv().await {
        tokio::time::sleep_until(deadline).await;
        if sink.send(event).is_err() {
            break;
        }
    }
}
