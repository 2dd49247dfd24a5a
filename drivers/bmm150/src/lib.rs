//! BMM150 3-axis magnetometer driver
//!
//! Brings the chip out of suspend, selects normal mode with the
//! enhanced repetition preset, and burst-reads the three field axes.
//! Readings are reported as raw signed counts (13-bit X/Y, 15-bit Z);
//! the trim-based compensation of the vendor driver is deliberately
//! omitted - downstream calibration removes the offset anyway.

#![cfg_attr(not(test), no_std)]

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Default I2C address (CSB high, SDO low).
pub const DEFAULT_ADDRESS: u8 = 0x10;

const CHIP_ID: u8 = 0x32;

const REG_CHIP_ID: u8 = 0x40;
const REG_DATA_X_LSB: u8 = 0x42;
const REG_POWER_CONTROL: u8 = 0x4B;
const REG_OP_MODE: u8 = 0x4C;
const REG_REP_XY: u8 = 0x51;
const REG_REP_Z: u8 = 0x52;

/// Enhanced preset: 15 XY repetitions, 27 Z repetitions.
const REP_XY_ENHANCED: u8 = 0x07;
const REP_Z_ENHANCED: u8 = 0x1A;

/// Driver errors.
#[derive(Debug)]
pub enum Error<E> {
    /// I2C transfer failed.
    Bus(E),
    /// Chip id register returned something other than a BMM150.
    UnknownChip(u8),
}

pub struct Bmm150<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Bmm150<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Power the chip up and program normal mode with the enhanced
    /// repetition preset. The chip id only reads valid after the
    /// power-control bit is set.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<I2C::Error>> {
        self.write_reg(REG_POWER_CONTROL, 0x01)?;
        delay.delay_ms(3); // start-up time from suspend

        let id = self.read_reg(REG_CHIP_ID)?;
        if id != CHIP_ID {
            return Err(Error::UnknownChip(id));
        }

        self.write_reg(REG_OP_MODE, 0x00)?; // normal mode, default ODR
        self.write_reg(REG_REP_XY, REP_XY_ENHANCED)?;
        self.write_reg(REG_REP_Z, REP_Z_ENHANCED)?;
        Ok(())
    }

    /// Field reading in raw signed counts.
    pub fn mag(&mut self) -> Result<(f32, f32, f32), Error<I2C::Error>> {
        let mut buf = [0u8; 8];
        self.i2c
            .write_read(self.address, &[REG_DATA_X_LSB], &mut buf)
            .map_err(Error::Bus)?;
        Ok(mag_from_raw(&buf))
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
}

/// Assemble the signed axis counts from the data block at 0x42.
/// X and Y carry 13 significant bits, Z carries 15; the low status
/// bits shift out with the sign-preserving arithmetic shift.
fn mag_from_raw(buf: &[u8; 8]) -> (f32, f32, f32) {
    let x = i16::from_le_bytes([buf[0], buf[1]]) >> 3;
    let y = i16::from_le_bytes([buf[2], buf[3]]) >> 3;
    let z = i16::from_le_bytes([buf[4], buf[5]]) >> 1;
    (x as f32, y as f32, z as f32)
}
