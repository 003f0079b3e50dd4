//! Signal filtering for the motion pipeline.
//!
//! Exponential low/high-pass filtering for the accelerometer path and
//! axis-angle gyroscope integration for the orientation path.

use crate::domain::models::{Quaternion, Vector3};

/// Nanoseconds to seconds.
pub const NANOS_TO_SEC: f32 = 1.0 / 1_000_000_000.0;

/// Exponential low-pass step: `alpha * prev + (1 - alpha) * sample` per axis.
///
/// `alpha` is the memory constant in `[0, 1]`: 0 passes the sample through
/// unchanged, 1 holds the previous state forever. NaN/Inf inputs propagate.
pub fn low_pass(prev: Vector3, sample: Vector3, alpha: f32) -> Vector3 {
    Vector3 {
        x: alpha * prev.x + (1.0 - alpha) * sample.x,
        y: alpha * prev.y + (1.0 - alpha) * sample.y,
        z: alpha * prev.z + (1.0 - alpha) * sample.z,
    }
}

/// High-pass step: the raw sample minus its low-pass component, isolating
/// transient motion. Must be fed the low-pass state updated in the same step.
pub fn high_pass(sample: Vector3, low_pass_state: Vector3) -> Vector3 {
    Vector3 {
        x: sample.x - low_pass_state.x,
        y: sample.y - low_pass_state.y,
        z: sample.z - low_pass_state.z,
    }
}

/// Integrate one gyroscope sample into a quaternion via axis-angle.
///
/// The axis is normalized only when the angular speed exceeds `epsilon`;
/// below that the axis direction is unreliable and the raw near-zero vector
/// is kept, so the resulting quaternion is near-identity without any division
/// by a tiny magnitude.
///
/// The returned quaternion is never composed with the previous orientation:
/// each step re-derives the full orientation from the instantaneous sample.
pub fn integrate_gyro(rate: Vector3, dt_seconds: f32, epsilon: f32) -> Quaternion {
    let mut axis_x = rate.x;
    let mut axis_y = rate.y;
    let mut axis_z = rate.z;

    let omega_magnitude = rate.magnitude();

    if omega_magnitude > epsilon {
        axis_x /= omega_magnitude;
        axis_y /= omega_magnitude;
        axis_z /= omega_magnitude;
    }

    let theta_over_two = omega_magnitude * dt_seconds / 2.0;
    let sin_theta = theta_over_two.sin();
    let cos_theta = theta_over_two.cos();

    Quaternion {
        x: sin_theta * axis_x,
        y: sin_theta * axis_y,
        z: sin_theta * axis_z,
        w: cos_theta,
    }
}

/// Rotation matrix (row-major 3x3) from a quaternion in (x, y, z, w) order.
fn rotation_matrix(q: Quaternion) -> [f32; 9] {
    let sq_x = 2.0 * q.x * q.x;
    let sq_y = 2.0 * q.y * q.y;
    let sq_z = 2.0 * q.z * q.z;
    let xy = 2.0 * q.x * q.y;
    let xz = 2.0 * q.x * q.z;
    let yz = 2.0 * q.y * q.z;
    let xw = 2.0 * q.x * q.w;
    let yw = 2.0 * q.y * q.w;
    let zw = 2.0 * q.z * q.w;

    [
        1.0 - sq_y - sq_z,
        xy - zw,
        xz + yw,
        xy + zw,
        1.0 - sq_x - sq_z,
        yz - xw,
        xz - yw,
        yz + xw,
        1.0 - sq_x - sq_y,
    ]
}

/// Extract (yaw, pitch, roll) in radians from a quaternion, using the
/// handset platform's orientation convention.
pub fn quaternion_to_euler(q: Quaternion) -> Vector3 {
    let r = rotation_matrix(q);
    Vector3 {
        x: r[1].atan2(r[4]),
        y: (-r[7]).asin(),
        z: (-r[6]).atan2(r[8]),
    }
}

/// Filter state owned exclusively by the sampling worker. Reset to zeroed
/// values on every monitor start.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    prev_low_pass: Vector3,
    orientation: Quaternion,
    last_gyro_timestamp_ns: Option<i64>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// One coupled accelerometer step: update the low-pass state, then
    /// return the high-pass signal computed against the fresh state.
    pub fn apply_accel(&mut self, sample: Vector3, alpha: f32) -> Vector3 {
        self.prev_low_pass = low_pass(self.prev_low_pass, sample, alpha);
        high_pass(sample, self.prev_low_pass)
    }

    /// One gyroscope step. The first sample only seeds the timestamp (no
    /// delta exists yet) and yields no orientation.
    pub fn apply_gyro(
        &mut self,
        rate: Vector3,
        timestamp_ns: i64,
        epsilon: f32,
    ) -> Option<Vector3> {
        let dt = match self.last_gyro_timestamp_ns {
            None => {
                self.last_gyro_timestamp_ns = Some(timestamp_ns);
                return None;
            }
            Some(prev) => (timestamp_ns - prev) as f32 * NANOS_TO_SEC,
        };
        self.last_gyro_timestamp_ns = Some(timestamp_ns);

        self.orientation = integrate_gyro(rate, dt, epsilon);
        Some(quaternion_to_euler(self.orientation))
    }
}
