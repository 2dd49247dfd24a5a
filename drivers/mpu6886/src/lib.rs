//! MPU6886 6-axis IMU driver
//!
//! Minimal I2C driver for the accelerometer/gyroscope/temperature
//! readings this device needs: fixed ±8 g and ±2000 deg/s ranges,
//! burst reads of the big-endian data registers, no FIFO or interrupt
//! support.
//!
//! # Example
//!
//! ```ignore
//! let mut imu = Mpu6886::new(i2c);
//! imu.init(&mut delay)?;
//! let (ax, ay, az) = imu.accel()?;
//! let (gx, gy, gz) = imu.gyro()?;
//! ```

#![cfg_attr(not(test), no_std)]

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Default I2C address (AD0 low).
pub const DEFAULT_ADDRESS: u8 = 0x68;

const CHIP_ID: u8 = 0x19;

const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_TEMP_OUT_H: u8 = 0x41;
const REG_GYRO_XOUT_H: u8 = 0x43;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

/// LSB weights for the fixed full-scale ranges.
const ACCEL_SCALE: f32 = 8.0 / 32768.0;
const GYRO_SCALE: f32 = 2000.0 / 32768.0;

/// Driver errors.
#[derive(Debug)]
pub enum Error<E> {
    /// I2C transfer failed.
    Bus(E),
    /// WHO_AM_I returned something other than an MPU6886.
    UnknownChip(u8),
}

pub struct Mpu6886<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mpu6886<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Verify the chip id, reset, and program clock, ranges, and
    /// low-pass filter.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<I2C::Error>> {
        let id = self.read_reg(REG_WHO_AM_I)?;
        if id != CHIP_ID {
            return Err(Error::UnknownChip(id));
        }

        self.write_reg(REG_PWR_MGMT_1, 0x80)?; // device reset
        delay.delay_ms(10);
        self.write_reg(REG_PWR_MGMT_1, 0x01)?; // auto clock select
        delay.delay_ms(10);
        self.write_reg(REG_ACCEL_CONFIG, 0x10)?; // ±8 g
        self.write_reg(REG_GYRO_CONFIG, 0x18)?; // ±2000 deg/s
        self.write_reg(REG_CONFIG, 0x01)?; // 176 Hz gyro DLPF
        self.write_reg(REG_SMPLRT_DIV, 0x05)?;
        Ok(())
    }

    /// Acceleration in g.
    pub fn accel(&mut self) -> Result<(f32, f32, f32), Error<I2C::Error>> {
        let buf = self.read_block::<6>(REG_ACCEL_XOUT_H)?;
        Ok(accel_from_raw(&buf))
    }

    /// Angular rate in deg/s.
    pub fn gyro(&mut self) -> Result<(f32, f32, f32), Error<I2C::Error>> {
        let buf = self.read_block::<6>(REG_GYRO_XOUT_H)?;
        Ok(gyro_from_raw(&buf))
    }

    /// Die temperature in °C.
    pub fn temperature(&mut self) -> Result<f32, Error<I2C::Error>> {
        let buf = self.read_block::<2>(REG_TEMP_OUT_H)?;
        Ok(temp_from_raw(i16::from_be_bytes(buf)))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.address, &[reg, value]).map_err(Error::Bus)
    }

    fn read_block<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], Error<I2C::Error>> {
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf)
    }
}

fn accel_from_raw(buf: &[u8; 6]) -> (f32, f32, f32) {
    (
        i16::from_be_bytes([buf[0], buf[1]]) as f32 * ACCEL_SCALE,
        i16::from_be_bytes([buf[2], buf[3]]) as f32 * ACCEL_SCALE,
        i16::from_be_bytes([buf[4], buf[5]]) as f32 * ACCEL_SCALE,
    )
}

fn gyro_from_raw(buf: &[u8; 6]) -> (f32, f32, f32) {
    (
        i16::from_be_bytes([buf[0], buf[1]]) as f32 * GYRO_SCALE,
        i16::from_be_bytes([buf[2], buf[3]]) as f32 * GYRO_SCALE,
        i16::from_be_bytes([buf[4], buf[5]]) as f32 * GYRO_SCALE,
    )
}

fn temp_from_raw(raw: i16) -> f32 {
    raw as f32 / 326.8 + 25.0
}
