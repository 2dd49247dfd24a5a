//! End-to-end pipeline test: restore calibration, run a full
//! user-triggered calibration cycle, and fuse orientation with the
//! production filter - all against fake hardware and a fake clock.

use attitude::{
    gyro_bias, CalibrationController, CalibrationPhase, CalibrationStore, GyroBias, Madgwick,
    MagCalibration, MemoryStore, OrientationFuser, RawSensorSource, Triax,
};

const RUN_DURATION_MS: u32 = 10_000;
const CYCLE_MS: u32 = 100;

/// Bench device: still, flat, with a fixed hard-iron bias on the
/// magnetometer and a small rate offset on the gyro.
struct BenchSource {
    cycle: u32,
}

impl BenchSource {
    fn new() -> Self {
        Self { cycle: 0 }
    }
}

impl RawSensorSource for BenchSource {
    fn read_accel(&mut self) -> Triax {
        Triax::new(0.0, 0.0, 1.0)
    }

    fn read_gyro(&mut self) -> Triax {
        Triax::new(1.0, -0.5, 0.2)
    }

    fn read_mag(&mut self) -> Triax {
        // Rotation sweep seen by the magnetometer: the field swings
        // between two extremes per axis
        self.cycle += 1;
        if self.cycle % 2 == 0 {
            Triax::new(100.0, 50.0, -20.0)
        } else {
            Triax::new(-60.0, 150.0, 40.0)
        }
    }

    fn read_temp(&mut self) -> f32 {
        31.5
    }
}

#[test]
fn test_calibrate_persist_reload_and_fuse() {
    let mut source = BenchSource::new();
    let mut store = MemoryStore::new();

    // Cold start: nothing persisted yet, fall back to identity
    let initial = store.load().unwrap_or_default();
    assert_eq!(initial, MagCalibration::default());

    let mut controller = CalibrationController::new(initial, RUN_DURATION_MS);
    let mut fuser = OrientationFuser::new(Madgwick::default(), 0.0);

    // Gyro bias capture at rest, fake delay
    let bias = gyro_bias::estimate(&mut source, 256, 5, |_| {});
    assert!((bias.x - 1.0).abs() < 1e-3);
    assert!((bias.y + 0.5).abs() < 1e-3);
    assert!((bias.z - 0.2).abs() < 1e-3);

    // Startup calibration run, driven by the polling loop
    assert!(controller.request_start(0));
    assert_eq!(controller.phase(), CalibrationPhase::Collecting);

    let mut now_ms = 0u32;
    let mut completed = None;
    fuser.seed(0);

    while completed.is_none() {
        now_ms += CYCLE_MS;
        let accel = source.read_accel();
        let gyro = source.read_gyro();
        let mag = source.read_mag();

        completed = controller.on_cycle(mag, now_ms, &mut store);

        let calibration = controller.calibration();
        let angles = fuser.update(
            accel,
            gyro,
            mag,
            &bias,
            &calibration,
            u64::from(now_ms) * 1000,
        );

        // The readout must stay well-formed through the whole run
        assert!((0.0..360.0).contains(&angles.yaw), "yaw = {}", angles.yaw);
        assert!((-90.0..=90.0).contains(&angles.pitch));
        assert!(angles.roll > -180.0 && angles.roll <= 180.0);
    }

    // The run finished on schedule with the midpoint offsets
    assert!(now_ms >= RUN_DURATION_MS);
    assert_eq!(controller.phase(), CalibrationPhase::Idle);
    let calibration = completed.unwrap();
    assert_eq!(calibration.offset, Triax::new(20.0, 100.0, 10.0));
    assert_eq!(calibration.scale, Triax::splat(1.0));

    // Power cycle: a new controller restores the exact same record
    let restored = store.load().expect("calibration should persist");
    assert_eq!(restored.offset.x.to_bits(), calibration.offset.x.to_bits());
    assert_eq!(restored.offset.y.to_bits(), calibration.offset.y.to_bits());
    assert_eq!(restored.offset.z.to_bits(), calibration.offset.z.to_bits());

    let controller = CalibrationController::new(restored, RUN_DURATION_MS);
    assert_eq!(controller.calibration(), calibration);
}

#[test]
fn test_calibration_does_not_reset_orientation() {
    let mut source = BenchSource::new();
    let mut store = MemoryStore::new();
    let mut controller = CalibrationController::new(MagCalibration::default(), 500);
    let mut fuser = OrientationFuser::new(Madgwick::default(), 0.0);
    let bias = GyroBias::default();

    fuser.seed(0);
    for cycle in 1..=20u32 {
        let now_ms = cycle * 10;
        let mag = source.read_mag();
        controller.on_cycle(mag, now_ms, &mut store);
        fuser.update(
            source.read_accel(),
            source.read_gyro(),
            mag,
            &bias,
            &controller.calibration(),
            u64::from(now_ms) * 1000,
        );
    }
    let before = fuser.quaternion();

    // Finishing a calibration run must leave the quaternion alone
    controller.request_start(300);
    controller.on_cycle(source.read_mag(), 400, &mut store);
    controller.on_cycle(source.read_mag(), 900, &mut store);
    assert_eq!(fuser.quaternion(), before);
}
