mod domain;
mod infrastructure;

use domain::mapper::{CommandTransport, OrientationCommandMapper};
use domain::models::SampleEvent;
use domain::monitor::{MonitorConfig, MotionMonitor};
use domain::settings::SettingsService;
use infrastructure::sensors::SyntheticSensorSource;
use infrastructure::transport::{ConsoleTransport, TcpCommandTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let _logging_guard =
        infrastructure::logging::init_logger(&settings_service.get().log_settings)?;

    info!("Starting BT Robot Remote motion client");
    // Materialize the validated settings file so tuning knobs are editable.
    if let Err(e) = settings_service.save() {
        warn!("failed to persist settings: {e}");
    }
    let settings = settings_service.get().clone();

    let transport: Box<dyn CommandTransport> = match settings.remote_addr.as_deref() {
        Some(addr) => Box::new(TcpCommandTransport::connect(addr)),
        None => {
            info!("no remote_addr configured, logging command frames instead");
            Box::new(ConsoleTransport)
        }
    };
    let mut mapper = OrientationCommandMapper::new(transport, settings.command_threshold);
    info!("command session status: {:?}", mapper.connection_status());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let source = Arc::new(SyntheticSensorSource::spawn());
    let mut monitor = MotionMonitor::new(source, event_tx, MonitorConfig::from_settings(&settings));
    monitor.start()?;
    debug!("monitor state: {:?}", monitor.state());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("shutdown requested");
                    break;
                }
                event = event_rx.recv() => match event {
                    Some(SampleEvent::Accel { vector }) => {
                        for intent in mapper.process(vector) {
                            if intent.active {
                                debug!("direction {:?} held", intent.direction);
                            }
                        }
                    }
                    // Orientation events feed the telemetry display only.
                    Some(SampleEvent::Gyro { vector, .. }) => {
                        debug!(
                            "orientation [yaw, pitch, roll]: {:.4}, {:.4}, {:.4}",
                            vector.x, vector.y, vector.z
                        );
                    }
                    None => break,
                }
            }
        }
    });

    monitor.stop()?;
    info!("BT Robot Remote motion client stopped");
    Ok(())
}
