//! Madgwick MARG quaternion integrator
//!
//! Gradient-descent orientation filter fusing accelerometer, gyroscope,
//! and magnetometer samples into a unit quaternion (Madgwick, "An
//! efficient orientation filter for inertial and inertial/magnetic
//! sensor arrays"). The fuser consumes it through [`AttitudeFilter`]
//! and never looks inside the integration math.

use crate::fusion::AttitudeFilter;
use crate::{Quat, Triax};

/// Filter gain `beta` tuned for a ~40 deg/s gyroscope error figure
/// (`sqrt(3/4) * gyro_error_rad`). Larger values converge faster but
/// pass more accelerometer noise into the estimate.
pub const DEFAULT_BETA: f32 = 0.6045;

/// Madgwick filter state: the running quaternion plus the gain.
pub struct Madgwick {
    q: Quat,
    beta: f32,
}

impl Madgwick {
    pub fn new(beta: f32) -> Self {
        Self {
            q: Quat::IDENTITY,
            beta,
        }
    }
}

impl Default for Madgwick {
    fn default() -> Self {
        Self::new(DEFAULT_BETA)
    }
}

impl AttitudeFilter for Madgwick {
    fn update(&mut self, accel: Triax, gyro_rad: Triax, mag: Triax, dt: f32) {
        let Quat {
            w: q0,
            x: q1,
            y: q2,
            z: q3,
        } = self.q;
        let (gx, gy, gz) = (gyro_rad.x, gyro_rad.y, gyro_rad.z);

        // Normalise the accelerometer; a zero-norm sample cannot steer
        // the corrective step, so the state is left untouched.
        let norm = (accel.x * accel.x + accel.y * accel.y + accel.z * accel.z).sqrt();
        if norm == 0.0 {
            return;
        }
        let ax = accel.x / norm;
        let ay = accel.y / norm;
        let az = accel.z / norm;

        // Same for the magnetometer.
        let norm = (mag.x * mag.x + mag.y * mag.y + mag.z * mag.z).sqrt();
        if norm == 0.0 {
            return;
        }
        let mx = mag.x / norm;
        let my = mag.y / norm;
        let mz = mag.z / norm;

        // Auxiliary products
        let _2q0 = 2.0 * q0;
        let _2q1 = 2.0 * q1;
        let _2q2 = 2.0 * q2;
        let _2q3 = 2.0 * q3;
        let _2q0q2 = 2.0 * q0 * q2;
        let _2q2q3 = 2.0 * q2 * q3;
        let q0q0 = q0 * q0;
        let q0q1 = q0 * q1;
        let q0q2 = q0 * q2;
        let q0q3 = q0 * q3;
        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q3q3 = q3 * q3;

        let _2q0mx = 2.0 * q0 * mx;
        let _2q0my = 2.0 * q0 * my;
        let _2q0mz = 2.0 * q0 * mz;
        let _2q1mx = 2.0 * q1 * mx;

        // Reference direction of Earth's magnetic field
        let hx = mx * q0q0 - _2q0my * q3 + _2q0mz * q2 + mx * q1q1 + _2q1 * my * q2
            + _2q1 * mz * q3
            - mx * q2q2
            - mx * q3q3;
        let hy = _2q0mx * q3 + my * q0q0 - _2q0mz * q1 + _2q1mx * q2 - my * q1q1 + my * q2q2
            + _2q2 * mz * q3
            - my * q3q3;
        let _2bx = (hx * hx + hy * hy).sqrt();
        let _2bz = -_2q0mx * q2 + _2q0my * q1 + mz * q0q0 + _2q1mx * q3 - mz * q1q1
            + _2q2 * my * q3
            - mz * q2q2
            + mz * q3q3;
        let _4bx = 2.0 * _2bx;
        let _4bz = 2.0 * _2bz;

        // Gradient descent corrective step
        let mut s0 = -_2q2 * (2.0 * q1q3 - _2q0q2 - ax) + _2q1 * (2.0 * q0q1 + _2q2q3 - ay)
            - _2bz * q2 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (-_2bx * q3 + _2bz * q1) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + _2bx * q2 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let mut s1 = _2q3 * (2.0 * q1q3 - _2q0q2 - ax) + _2q0 * (2.0 * q0q1 + _2q2q3 - ay)
            - 4.0 * q1 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
            + _2bz * q3 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (_2bx * q2 + _2bz * q0) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + (_2bx * q3 - _4bz * q1) * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let mut s2 = -_2q0 * (2.0 * q1q3 - _2q0q2 - ax) + _2q3 * (2.0 * q0q1 + _2q2q3 - ay)
            - 4.0 * q2 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
            + (-_4bx * q2 - _2bz * q0) * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (_2bx * q1 + _2bz * q3) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + (_2bx * q0 - _4bz * q2) * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
        let mut s3 = _2q1 * (2.0 * q1q3 - _2q0q2 - ax) + _2q2 * (2.0 * q0q1 + _2q2q3 - ay)
            + (-_4bx * q3 + _2bz * q1) * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
            + (-_2bx * q0 + _2bz * q2) * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
            + _2bx * q1 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);

        // Zero gradient means the estimate already matches both field
        // observations; skip the normalisation to avoid 0/0.
        let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
        if s_norm > 0.0 {
            s0 /= s_norm;
            s1 /= s_norm;
            s2 /= s_norm;
            s3 /= s_norm;
        }

        // Rate of change of quaternion from gyro, minus the corrective step
        let q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz) - self.beta * s0;
        let q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy) - self.beta * s1;
        let q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx) - self.beta * s2;
        let q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx) - self.beta * s3;

        // Integrate and renormalise
        let q0 = q0 + q_dot0 * dt;
        let q1 = q1 + q_dot1 * dt;
        let q2 = q2 + q_dot2 * dt;
        let q3 = q3 + q_dot3 * dt;
        let norm = (q0 * q0 + q1 * q1 + q2 * q2 + q3 * q3).sqrt();
        self.q = Quat::new(q0 / norm, q1 / norm, q2 / norm, q3 / norm);
    }

    fn quaternion(&self) -> Quat {
        self.q
    }
}
