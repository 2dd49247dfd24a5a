//! Static gyroscope bias estimation
//!
//! The gyroscope reports a small constant rate even at rest. A fixed
//! number of samples averaged during startup, while the operator holds
//! the device still, gives a bias that is subtracted from every later
//! reading. Stillness is instructed, not verified.

use log::info;

use crate::sensors::RawSensorSource;
use crate::Triax;

/// Constant rate offset subtracted from every gyroscope reading, in
/// deg/s. Held for the process lifetime, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroBias {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GyroBias {
    /// Remove the bias from a raw reading.
    pub fn correct(&self, raw: Triax) -> Triax {
        Triax::new(raw.x - self.x, raw.y - self.y, raw.z - self.z)
    }
}

/// Accumulates gyroscope samples taken at rest and averages them.
pub struct GyroBiasEstimator {
    sum: Triax,
    count: u32,
    target: u32,
}

impl GyroBiasEstimator {
    pub fn new(target: u32) -> Self {
        Self {
            sum: Triax::default(),
            count: 0,
            target: target.max(1),
        }
    }

    pub fn add_sample(&mut self, s: Triax) {
        if self.is_complete() {
            return;
        }
        self.sum.x += s.x;
        self.sum.y += s.y;
        self.sum.z += s.z;
        self.count += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.count >= self.target
    }

    /// Collection progress from 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        self.count as f32 / self.target as f32
    }

    /// Average of the collected samples. Zero until the first sample
    /// arrives.
    pub fn bias(&self) -> GyroBias {
        if self.count == 0 {
            return GyroBias::default();
        }
        let n = self.count as f32;
        GyroBias {
            x: self.sum.x / n,
            y: self.sum.y / n,
            z: self.sum.z / n,
        }
    }
}

/// Collect `sample_count` gyroscope readings at `sample_interval_ms`
/// cadence and average them. Blocks for the whole collection; normal
/// operation is frozen while this runs.
pub fn estimate<S, D>(
    source: &mut S,
    sample_count: u32,
    sample_interval_ms: u32,
    mut delay_ms: D,
) -> GyroBias
where
    S: RawSensorSource,
    D: FnMut(u32),
{
    info!("Gyro bias: collecting {} samples, keep the device still", sample_count);

    let mut estimator = GyroBiasEstimator::new(sample_count);
    let mut last_progress = 0;

    while !estimator.is_complete() {
        estimator.add_sample(source.read_gyro());

        let progress = (estimator.progress() * 100.0) as u32;
        if progress > last_progress && progress % 10 == 0 {
            info!("Gyro bias progress: {}%", progress);
            last_progress = progress;
        }

        delay_ms(sample_interval_ms);
    }

    let bias = estimator.bias();
    info!(
        "Gyro bias: ({:.4}, {:.4}, {:.4}) deg/s",
        bias.x, bias.y, bias.z
    );
    bias
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples_average_to_themselves() {
        let mut est = GyroBiasEstimator::new(256);
        for _ in 0..256 {
            est.add_sample(Triax::new(1.0, -0.5, 0.2));
        }
        assert!(est.is_complete());

        let bias = est.bias();
        assert!((bias.x - 1.0).abs() < 1e-4);
        assert!((bias.y + 0.5).abs() < 1e-4);
        assert!((bias.z - 0.2).abs() < 1e-4);

        // Correcting an identical live sample cancels it out
        let corrected = bias.correct(Triax::new(1.0, -0.5, 0.2));
        assert!(corrected.x.abs() < 1e-4);
        assert!(corrected.y.abs() < 1e-4);
        assert!(corrected.z.abs() < 1e-4);
    }

    #[test]
    fn test_extra_samples_after_completion_are_ignored() {
        let mut est = GyroBiasEstimator::new(2);
        est.add_sample(Triax::new(1.0, 1.0, 1.0));
        est.add_sample(Triax::new(3.0, 3.0, 3.0));
        est.add_sample(Triax::new(100.0, 100.0, 100.0));

        let bias = est.bias();
        assert!((bias.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_bias_is_zero_without_samples() {
        let est = GyroBiasEstimator::new(10);
        assert_eq!(est.bias(), GyroBias::default());
    }

    #[test]
    fn test_progress_tracks_count() {
        let mut est = GyroBiasEstimator::new(4);
        assert_eq!(est.progress(), 0.0);
        est.add_sample(Triax::default());
        assert_eq!(est.progress(), 0.25);
        est.add_sample(Triax::default());
        est.add_sample(Triax::default());
        est.add_sample(Triax::default());
        assert_eq!(est.progress(), 1.0);
    }

    struct StillSource;

    impl RawSensorSource for StillSource {
        fn read_accel(&mut self) -> Triax {
            Triax::new(0.0, 0.0, 1.0)
        }
        fn read_gyro(&mut self) -> Triax {
            Triax::new(0.75, -0.25, 0.1)
        }
        fn read_mag(&mut self) -> Triax {
            Triax::default()
        }
        fn read_temp(&mut self) -> f32 {
            25.0
        }
    }

    #[test]
    fn test_blocking_estimate_drives_the_source() {
        let mut source = StillSource;
        let mut delays = 0u32;
        let bias = estimate(&mut source, 64, 5, |_| delays += 1);

        assert_eq!(delays, 64);
        assert!((bias.x - 0.75).abs() < 1e-4);
        assert!((bias.y + 0.25).abs() < 1e-4);
        assert!((bias.z - 0.1).abs() < 1e-4);
    }
}
