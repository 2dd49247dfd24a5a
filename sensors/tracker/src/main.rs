mod config;
mod imu;
mod nvs_storage;

use std::cell::RefCell;

use attitude::{gyro_bias, CalibrationController, CalibrationStore, Madgwick, OrientationFuser, RawSensorSource};
use bmm150::Bmm150;
use config::SystemConfig;
use embedded_hal_bus::i2c::RefCellDevice;
use esp_idf_hal::{
    delay::{Delay, FreeRtos},
    gpio::PinDriver,
    i2c::{I2cConfig, I2cDriver},
    peripherals::Peripherals,
    units::FromValueType,
};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use imu::SensorManager;
use log::{error, info, warn};
use mpu6886::Mpu6886;
use nvs_storage::NvsStorage;

fn now_us() -> u64 {
    unsafe { esp_idf_svc::sys::esp_timer_get_time() as u64 }
}

fn now_ms() -> u32 {
    (now_us() / 1000) as u32
}

/// Sensor bring-up failed. Orientation output is meaningless without
/// the full suite, so hold here and keep the failure visible.
fn halt(context: &str) -> ! {
    error!("{} failed, power-cycle to retry", context);
    loop {
        FreeRtos::delay_ms(100);
    }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let config = SystemConfig::from_env();

    info!("=== Orientation Tracker ===");
    info!(
        "Calibration window: {} ms, gyro samples: {}, declination: {:.1}°",
        config.calibration.run_duration_ms,
        config.gyro_bias.sample_count,
        config.fusion.declination_deg
    );

    let peripherals = Peripherals::take().unwrap();
    let mut delay = Delay::new_default();

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(400_u32.kHz().into()),
    )
    .unwrap();
    let bus = RefCell::new(i2c);

    // Front button re-triggers calibration; the board pulls it up
    let button = PinDriver::input(peripherals.pins.gpio39).unwrap();

    let mut imu = Mpu6886::new(RefCellDevice::new(&bus));
    if let Err(e) = imu.init(&mut delay) {
        warn!("MPU6886 init error: {:?}", e);
        halt("IMU bring-up");
    }

    let mut mag = Bmm150::new(RefCellDevice::new(&bus));
    if let Err(e) = mag.init(&mut delay) {
        warn!("BMM150 init error: {:?}", e);
        halt("Magnetometer bring-up");
    }

    let mut sensors = SensorManager::new(imu, mag);

    // Restore the persisted calibration; identity when nothing is stored
    let mut store = NvsStorage::new(EspDefaultNvsPartition::take().ok());
    let calibration = store.load().unwrap_or_default();
    let mut controller =
        CalibrationController::new(calibration, config.calibration.run_duration_ms);

    // Boot readout with the restored offsets
    let m = sensors.read_mag();
    let offset = controller.calibration().offset;
    let heading = (m.x - offset.x).atan2(m.y - offset.y).to_degrees();
    info!(
        "Mag: ({:.2}, {:.2}, {:.2}), flat heading {:.2}°",
        m.x, m.y, m.z, heading
    );

    // Gyro bias capture; the operator keeps the device still
    let bias = gyro_bias::estimate(
        &mut sensors,
        config.gyro_bias.sample_count,
        config.gyro_bias.sample_interval_ms,
        FreeRtos::delay_ms,
    );

    // Mandatory startup calibration run
    info!(
        "Flip and rotate the device; calibration starts in {} s",
        config.calibration.startup_warning_ms / 1000
    );
    FreeRtos::delay_ms(config.calibration.startup_warning_ms);
    controller.request_start(now_ms());

    let mut fuser = OrientationFuser::new(
        Madgwick::new(config.fusion.filter_beta),
        config.fusion.declination_deg,
    );
    fuser.seed(now_us());

    let mut button_was_down = false;
    let mut last_readout_ms = now_ms();

    info!("=== Entering main loop ===");

    loop {
        let cycle_us = now_us();
        let cycle_ms = (cycle_us / 1000) as u32;

        let accel = sensors.read_accel();
        let gyro = sensors.read_gyro();
        let mag_sample = sensors.read_mag();

        // Press edge arms a new run; ignored while one is collecting
        let button_down = button.is_low();
        if button_down && !button_was_down && controller.request_start(cycle_ms) {
            info!("Calibration requested, rotate the device through all axes");
        }
        button_was_down = button_down;

        if let Some(updated) = controller.on_cycle(mag_sample, cycle_ms, &mut store) {
            info!(
                "Calibration updated: offset ({:.2}, {:.2}, {:.2})",
                updated.offset.x, updated.offset.y, updated.offset.z
            );
        }

        let calibration = controller.calibration();
        let angles = fuser.update(accel, gyro, mag_sample, &bias, &calibration, cycle_us);

        if cycle_ms.wrapping_sub(last_readout_ms) >= config.readout_interval_ms {
            let temp = sensors.read_temp();
            info!(
                "yaw {:6.2}°  pitch {:6.2}°  roll {:6.2}°  temp {:.2}°C",
                angles.yaw, angles.pitch, angles.roll, temp
            );
            last_readout_ms = cycle_ms;
        }

        FreeRtos::delay_ms(config.cycle_interval_ms);
    }
}
