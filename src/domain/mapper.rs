//! Maps filtered acceleration to directional commands under hysteresis.

use crate::domain::models::{ConnectionStatus, DirectionCommand, HighlightIntent, Vector3};
use crate::domain::settings::CommandThreshold;
use tracing::{debug, warn};

/// The original control scheme maps positive x tilt to Left, not Right.
/// Kept behind a constant so a confirmed correction is a one-line change.
pub const POSITIVE_X_MAPS_TO_LEFT: bool = true;

/// Outgoing command stream at the session boundary. Implemented by the
/// transport layer; writes are only attempted while `Connected`.
pub trait CommandTransport: Send {
    fn status(&self) -> ConnectionStatus;
    fn write_frame(&mut self, frame: &[u8]) -> anyhow::Result<()>;
}

pub struct OrientationCommandMapper {
    transport: Box<dyn CommandTransport>,
    threshold: CommandThreshold,
}

impl OrientationCommandMapper {
    pub fn new(transport: Box<dyn CommandTransport>, threshold: CommandThreshold) -> Self {
        Self {
            transport,
            threshold,
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    /// Evaluate one filtered acceleration sample.
    ///
    /// Level-triggered: every sample held past the trigger threshold
    /// re-sends its command; there is no latching across samples. Each
    /// direction always yields a highlight intent, active or clear, so the
    /// display tracks the signal even while disconnected.
    pub fn process(&mut self, vector: Vector3) -> Vec<HighlightIntent> {
        if !vector.is_finite() {
            warn!("discarding malformed acceleration sample: {vector:?}");
            return Vec::new();
        }

        let mut intents = Vec::with_capacity(4);
        for (direction, active) in self.evaluate(vector) {
            if active {
                self.send_command(direction);
            }
            intents.push(HighlightIntent { direction, active });
        }
        intents
    }

    fn evaluate(&self, v: Vector3) -> [(DirectionCommand, bool); 4] {
        let t = self.threshold.trigger_threshold;
        let (pos_x, neg_x) = if POSITIVE_X_MAPS_TO_LEFT {
            (DirectionCommand::Left, DirectionCommand::Right)
        } else {
            (DirectionCommand::Right, DirectionCommand::Left)
        };

        // Inside the neutral zone nothing can be active; the threshold
        // invariant guarantees trigger > neutral.
        if v.x.abs() <= self.threshold.neutral_zone && v.y.abs() <= self.threshold.neutral_zone {
            return [
                (DirectionCommand::Forward, false),
                (DirectionCommand::Backward, false),
                (pos_x, false),
                (neg_x, false),
            ];
        }

        [
            (DirectionCommand::Forward, v.y <= -t),
            (DirectionCommand::Backward, v.y >= t),
            (pos_x, v.x >= t),
            (neg_x, v.x <= -t),
        ]
    }

    fn send_command(&mut self, direction: DirectionCommand) {
        // Session not connected: suppress the write, not an error.
        if self.transport.status() != ConnectionStatus::Connected {
            debug!("suppressing {direction:?} command, session not connected");
            return;
        }
        let frame = direction.wire_frame();
        if let Err(e) = self.transport.write_frame(&frame) {
            warn!("failed to write {direction:?} command frame: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingTransport {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        status: ConnectionStatus,
    }

    impl CommandTransport for RecordingTransport {
        fn status(&self) -> ConnectionStatus {
            self.status
        }

        fn write_frame(&mut self, frame: &[u8]) -> anyhow::Result<()> {
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    fn mapper_with_status(
        status: ConnectionStatus,
    ) -> (OrientationCommandMapper, Arc<Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport {
            frames: frames.clone(),
            status,
        };
        (
            OrientationCommandMapper::new(Box::new(transport), CommandThreshold::default()),
            frames,
        )
    }

    fn active_directions(intents: &[HighlightIntent]) -> Vec<DirectionCommand> {
        intents
            .iter()
            .filter(|i| i.active)
            .map(|i| i.direction)
            .collect()
    }

    #[test]
    fn test_positive_x_maps_to_left() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(0.2, 0.0, 0.0));
        assert_eq!(active_directions(&intents), vec![DirectionCommand::Left]);
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"HML".to_vec()]);
    }

    #[test]
    fn test_negative_y_maps_to_forward() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(0.0, -0.2, 0.0));
        assert_eq!(active_directions(&intents), vec![DirectionCommand::Forward]);
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"HMF".to_vec()]);
    }

    #[test]
    fn test_neutral_zone_emits_nothing() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(0.05, 0.05, 0.0));
        assert!(active_directions(&intents).is_empty());
        assert!(frames.lock().unwrap().is_empty());
        // Clear intents still cover all four directions.
        assert_eq!(intents.len(), 4);
    }

    #[test]
    fn test_level_triggered_resend() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let held = Vector3::new(0.0, 0.3, 0.0);
        mapper.process(held);
        mapper.process(held);
        mapper.process(held);
        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f == b"HMB"));
    }

    #[test]
    fn test_disconnected_suppresses_writes() {
        for status in [ConnectionStatus::Disconnected, ConnectionStatus::Connecting] {
            let (mut mapper, frames) = mapper_with_status(status);
            let intents = mapper.process(Vector3::new(-0.5, 0.0, 0.0));
            // Highlights still fire; only the wire write is suppressed.
            assert_eq!(active_directions(&intents), vec![DirectionCommand::Right]);
            assert!(frames.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn test_diagonal_activates_two_directions() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(0.2, -0.2, 0.0));
        assert_eq!(
            active_directions(&intents),
            vec![DirectionCommand::Forward, DirectionCommand::Left]
        );
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let (mut mapper, _) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(0.0, 0.10, 0.0));
        assert_eq!(active_directions(&intents), vec![DirectionCommand::Backward]);
    }

    #[test]
    fn test_malformed_sample_discarded() {
        let (mut mapper, frames) = mapper_with_status(ConnectionStatus::Connected);
        let intents = mapper.process(Vector3::new(f32::NAN, 5.0, 0.0));
        assert!(intents.is_empty());
        assert!(frames.lock().unwrap().is_empty());
    }
}
