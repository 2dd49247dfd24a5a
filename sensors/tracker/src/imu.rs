//! Sensor suite adapter
//!
//! Owns both chip drivers on the shared I2C bus and adapts them to the
//! core's `RawSensorSource` contract. Transient bus errors surface as
//! zero readings, the same path the pipeline already takes for dropped
//! magnetometer samples.

use attitude::{RawSensorSource, Triax};
use bmm150::Bmm150;
use embedded_hal::i2c::I2c;
use mpu6886::Mpu6886;

pub struct SensorManager<I2C> {
    imu: Mpu6886<I2C>,
    mag: Bmm150<I2C>,
}

impl<I2C: I2c> SensorManager<I2C> {
    pub fn new(imu: Mpu6886<I2C>, mag: Bmm150<I2C>) -> Self {
        Self { imu, mag }
    }
}

impl<I2C: I2c> RawSensorSource for SensorManager<I2C> {
    fn read_accel(&mut self) -> Triax {
        match self.imu.accel() {
            Ok((x, y, z)) => Triax::new(x, y, z),
            Err(_) => Triax::default(),
        }
    }

    fn read_gyro(&mut self) -> Triax {
        match self.imu.gyro() {
            Ok((x, y, z)) => Triax::new(x, y, z),
            Err(_) => Triax::default(),
        }
    }

    fn read_mag(&mut self) -> Triax {
        match self.mag.mag() {
            Ok((x, y, z)) => Triax::new(x, y, z),
            Err(_) => Triax::default(),
        }
    }

    fn read_temp(&mut self) -> f32 {
        self.imu.temperature().unwrap_or(0.0)
    }
}
