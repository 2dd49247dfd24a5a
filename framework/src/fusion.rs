//! Orientation fusion and Euler angle extraction
//!
//! Each cycle takes the raw sensor triple, applies the gyro bias and
//! magnetometer calibration, advances the quaternion integrator by the
//! elapsed time, and converts the quaternion into wrapped,
//! declination-adjusted yaw/pitch/roll for the readout.

use crate::gyro_bias::GyroBias;
use crate::mag_cal::MagCalibration;
use crate::{Quat, Triax};

/// Quaternion integrator consumed by the fuser.
///
/// Inputs are accelerometer in g, gyroscope in rad/s, magnetometer in
/// calibrated raw units, and the elapsed time in seconds. The
/// implementation owns the quaternion and keeps it unit-norm.
pub trait AttitudeFilter {
    fn update(&mut self, accel: Triax, gyro_rad: Triax, mag: Triax, dt: f32);
    fn quaternion(&self) -> Quat;
}

/// Orientation readout in degrees. Yaw is wrapped to [0, 360), pitch is
/// [-90, 90], roll is (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Quarter-turn between the sensor package axes and the device front.
const MOUNT_YAW_OFFSET_DEG: f32 = -90.0;

/// Runs the fusion pipeline and owns the only orientation state: the
/// integrator's quaternion and the previous sample timestamp.
pub struct OrientationFuser<F> {
    filter: F,
    declination_deg: f32,
    last_update_us: u64,
}

impl<F: AttitudeFilter> OrientationFuser<F> {
    /// `declination_deg` is the local magnetic declination, subtracted
    /// from the heading so it reads against true north.
    pub fn new(filter: F, declination_deg: f32) -> Self {
        Self {
            filter,
            declination_deg,
            last_update_us: 0,
        }
    }

    /// Set the timestamp base. Call once right before the first
    /// [`update`](Self::update) so the initial dt does not span the
    /// whole boot sequence and destabilise the filter.
    pub fn seed(&mut self, now_us: u64) {
        self.last_update_us = now_us;
    }

    pub fn quaternion(&self) -> Quat {
        self.filter.quaternion()
    }

    /// Run one fusion cycle and return the current orientation.
    ///
    /// `accel` in g, `gyro` in deg/s, `mag_raw` in raw sensor units,
    /// `now_us` from a monotonic microsecond clock.
    pub fn update(
        &mut self,
        accel: Triax,
        gyro: Triax,
        mag_raw: Triax,
        bias: &GyroBias,
        calibration: &MagCalibration,
        now_us: u64,
    ) -> EulerAngles {
        let gyro = bias.correct(gyro);
        let mag = calibration.apply(mag_raw);

        let dt = now_us.wrapping_sub(self.last_update_us) as f32 / 1_000_000.0;
        self.last_update_us = now_us;

        let gyro_rad = Triax::new(
            gyro.x.to_radians(),
            gyro.y.to_radians(),
            gyro.z.to_radians(),
        );
        // The magnetometer package sits with its X/Y axes swapped
        // relative to the inertial sensor.
        let mag = Triax::new(mag.y, mag.x, mag.z);

        self.filter.update(accel, gyro_rad, mag, dt);

        let mut angles = angles_from_quat(self.filter.quaternion());
        angles.yaw += MOUNT_YAW_OFFSET_DEG;
        angles.yaw -= self.declination_deg;
        angles.yaw = wrap_yaw(angles.yaw);
        angles
    }
}

/// Extract aerospace-sequence yaw/pitch/roll in degrees from a unit
/// quaternion. The arcsine argument is clamped to [-1, 1] so
/// floating-point overshoot near ±90° pitch cannot produce NaN.
pub fn angles_from_quat(q: Quat) -> EulerAngles {
    let Quat { w, x, y, z } = q;

    let yaw = (2.0 * (x * y + w * z)).atan2(w * w + x * x - y * y - z * z);
    let pitch = -(2.0 * (x * z - w * y)).clamp(-1.0, 1.0).asin();
    let roll = (2.0 * (w * x + y * z)).atan2(w * w - x * x - y * y + z * z);

    let mut roll = roll.to_degrees();
    if roll <= -180.0 {
        roll += 360.0;
    }

    EulerAngles {
        yaw: yaw.to_degrees(),
        pitch: pitch.to_degrees(),
        roll,
    }
}

/// Wrap a heading into [0, 360). Per-cycle movement is bounded, so a
/// single correction step is enough.
fn wrap_yaw(mut yaw: f32) -> f32 {
    if yaw < 0.0 {
        yaw += 360.0;
    }
    if yaw >= 360.0 {
        yaw -= 360.0;
    }
    yaw
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Filter stub reporting a fixed quaternion.
    struct Fixed(Quat);

    impl AttitudeFilter for Fixed {
        fn update(&mut self, _accel: Triax, _gyro_rad: Triax, _mag: Triax, _dt: f32) {}
        fn quaternion(&self) -> Quat {
            self.0
        }
    }

    /// Filter stub recording the inputs of the last update.
    #[derive(Default)]
    struct Recording {
        accel: Triax,
        gyro_rad: Triax,
        mag: Triax,
        dt: f32,
    }

    impl AttitudeFilter for &mut Recording {
        fn update(&mut self, accel: Triax, gyro_rad: Triax, mag: Triax, dt: f32) {
            self.accel = accel;
            self.gyro_rad = gyro_rad;
            self.mag = mag;
            self.dt = dt;
        }
        fn quaternion(&self) -> Quat {
            Quat::IDENTITY
        }
    }

    #[test]
    fn test_identity_quaternion_reads_270_degrees() {
        let mut fuser = OrientationFuser::new(Fixed(Quat::IDENTITY), 0.0);
        fuser.seed(0);
        let angles = fuser.update(
            Triax::new(0.0, 0.0, 1.0),
            Triax::default(),
            Triax::new(20.0, 0.0, -40.0),
            &GyroBias::default(),
            &MagCalibration::default(),
            10_000,
        );
        assert!((angles.yaw - 270.0).abs() < 1e-4, "yaw = {}", angles.yaw);
        assert!(angles.pitch.abs() < 1e-4);
        assert!(angles.roll.abs() < 1e-4);
    }

    #[test]
    fn test_yaw_rotation_is_offset_and_wrapped() {
        // 45 degrees about Z: q = (cos 22.5, 0, 0, sin 22.5)
        let q = Quat::new(0.923_879_5, 0.0, 0.0, 0.382_683_4);
        let mut fuser = OrientationFuser::new(Fixed(q), 0.0);
        fuser.seed(0);
        let angles = fuser.update(
            Triax::new(0.0, 0.0, 1.0),
            Triax::default(),
            Triax::new(20.0, 0.0, -40.0),
            &GyroBias::default(),
            &MagCalibration::default(),
            10_000,
        );
        // 45 - 90 wraps to 315
        assert!((angles.yaw - 315.0).abs() < 1e-3, "yaw = {}", angles.yaw);
    }

    #[test]
    fn test_declination_shifts_heading() {
        let mut fuser = OrientationFuser::new(Fixed(Quat::IDENTITY), 8.5);
        fuser.seed(0);
        let angles = fuser.update(
            Triax::new(0.0, 0.0, 1.0),
            Triax::default(),
            Triax::new(20.0, 0.0, -40.0),
            &GyroBias::default(),
            &MagCalibration::default(),
            10_000,
        );
        assert!((angles.yaw - 261.5).abs() < 1e-3, "yaw = {}", angles.yaw);
    }

    #[test]
    fn test_arcsine_overshoot_is_clamped() {
        // Components chosen so 2(xz - wy) lands just past ±1 after
        // rounding; the clamp must pin pitch to ±90 instead of NaN
        let q = Quat::new(0.0, 0.707_107_2, 0.0, 0.707_107_2);
        let angles = angles_from_quat(q);
        assert!(!angles.pitch.is_nan());
        assert!((angles.pitch + 90.0).abs() < 1e-3, "pitch = {}", angles.pitch);

        let q = Quat::new(0.0, 0.707_107_2, 0.0, -0.707_107_2);
        let angles = angles_from_quat(q);
        assert!(!angles.pitch.is_nan());
        assert!((angles.pitch - 90.0).abs() < 1e-3, "pitch = {}", angles.pitch);
    }

    #[test]
    fn test_angle_ranges_over_sample_rotations() {
        let cases = [
            Quat::IDENTITY,
            Quat::new(0.923_879_5, 0.0, 0.0, -0.382_683_4),
            Quat::new(0.707_106_8, 0.707_106_8, 0.0, 0.0),
            Quat::new(0.707_106_8, 0.0, 0.707_106_8, 0.0),
            Quat::new(0.0, 1.0, 0.0, 0.0),
            Quat::new(0.5, -0.5, 0.5, -0.5),
        ];
        for q in cases {
            let angles = angles_from_quat(q);
            let yaw = wrap_yaw(angles.yaw + MOUNT_YAW_OFFSET_DEG);
            assert!((0.0..360.0).contains(&yaw), "yaw = {}", yaw);
            assert!(
                (-90.0..=90.0).contains(&angles.pitch),
                "pitch = {}",
                angles.pitch
            );
            assert!(
                angles.roll > -180.0 && angles.roll <= 180.0,
                "roll = {}",
                angles.roll
            );
        }
    }

    #[test]
    fn test_update_corrects_and_remaps_inputs() {
        let mut recorder = Recording::default();
        let mut fuser = OrientationFuser::new(&mut recorder, 0.0);
        fuser.seed(1_000_000);

        let bias = GyroBias {
            x: 1.0,
            y: -0.5,
            z: 0.2,
        };
        let calibration = MagCalibration::new(Triax::new(20.0, 100.0, 10.0), Triax::splat(1.0));

        fuser.update(
            Triax::new(0.0, 0.0, 1.0),
            Triax::new(1.0, -0.5, 0.2),
            Triax::new(120.0, 150.0, -30.0),
            &bias,
            &calibration,
            1_010_000,
        );
        drop(fuser);

        // Accel passes through untouched
        assert_eq!(recorder.accel, Triax::new(0.0, 0.0, 1.0));
        // Bias-corrected gyro is zero after radian conversion
        assert!(recorder.gyro_rad.x.abs() < 1e-6);
        assert!(recorder.gyro_rad.y.abs() < 1e-6);
        assert!(recorder.gyro_rad.z.abs() < 1e-6);
        // Calibrated mag is (100, 50, -40), handed over X/Y swapped
        assert_eq!(recorder.mag, Triax::new(50.0, 100.0, -40.0));
        // dt spans the 10 ms between timestamps
        assert!((recorder.dt - 0.01).abs() < 1e-6);
    }
}
