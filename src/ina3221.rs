// INA3221 three-channel shunt/bus voltage monitor over I2C.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use embedded_hal::i2c::I2c;
use log::*;
use thiserror::Error;

use crate::channels::{AveragingMode, Channel, SenseChip, CURRENT_SCALE_TO_MA};

/// A0 tied to GND.
pub const DEFAULT_ADDRESS: u8 = 0x40;

const REG_CONFIG: u8 = 0x00;
const REG_MANUFACTURER_ID: u8 = 0xFE;
const MANUFACTURER_ID_TI: u16 = 0x5449;

const CONFIG_RESET: u16 = 0x8000;
const CONFIG_AVG_MASK: u16 = 0x0E00;
const CONFIG_AVG_SHIFT: u16 = 9;

const SHUNT_LSB_UV: f32 = 40.0;
const BUS_LSB_MV: f32 = 8.0;
/// Power-on value of the alert limit registers (limit disabled).
const ALERT_LIMIT_DISABLED: u16 = 0x7FF8;

#[derive(Debug, Error)]
pub enum SensorError<E: core::fmt::Debug> {
    #[error("i2c bus error: {0:?}")]
    Bus(E),
    #[error("unexpected manufacturer id {0:#06x}")]
    WrongDevice(u16),
}

fn shunt_reg(ch: Channel) -> u8 {
    0x01 + 2 * ch.index() as u8
}

fn bus_reg(ch: Channel) -> u8 {
    0x02 + 2 * ch.index() as u8
}

fn crit_alert_reg(ch: Channel) -> u8 {
    0x07 + 2 * ch.index() as u8
}

fn warn_alert_reg(ch: Channel) -> u8 {
    0x08 + 2 * ch.index() as u8
}

fn enable_bit(ch: Channel) -> u16 {
    0x4000 >> ch.index()
}

fn avg_code(mode: AveragingMode) -> u16 {
    match mode {
        AveragingMode::X1 => 0b000,
        AveragingMode::X4 => 0b001,
        AveragingMode::X16 => 0b010,
        AveragingMode::X64 => 0b011,
        AveragingMode::X128 => 0b100,
    }
}

/// Value registers keep their data in bits 15..3, two's complement.
fn decode_value(raw: u16) -> i16 {
    (raw as i16) >> 3
}

/// Alert limit register value for `current_ma` through a shunt of
/// `shunt_mohm`. Negative currents disable the limit.
fn alert_limit_value(current_ma: i32, shunt_mohm: u32) -> u16 {
    if current_ma < 0 {
        return ALERT_LIMIT_DISABLED;
    }
    // mA * mOhm = uV
    let uv = current_ma as f32 * shunt_mohm as f32;
    let steps = (uv / SHUNT_LSB_UV) as i32;
    let steps = steps.min(0x0FFF);
    (steps as u16) << 3
}

pub struct Ina3221<I2C> {
    i2c: I2C,
    address: u8,
    shunt_mohm: [u32; 3],
}

impl<I2C: I2c> Ina3221<I2C> {
    pub fn new(i2c: I2C, address: u8, shunt_mohm: [u32; 3]) -> Self {
        Ina3221 { i2c, address, shunt_mohm }
    }

    /// Checks the manufacturer id, resets the chip and selects averaging 1.
    pub fn begin(&mut self) -> Result<(), SensorError<I2C::Error>> {
        let id = self.read_reg(REG_MANUFACTURER_ID)?;
        if id != MANUFACTURER_ID_TI {
            return Err(SensorError::WrongDevice(id));
        }
        self.write_reg(REG_CONFIG, CONFIG_RESET)?;
        self.set_averaging(AveragingMode::X1)?;
        let config = self.read_reg(REG_CONFIG)?;
        info!("INA3221 at {:#04x} ready, config={:04x}", self.address, config);
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16, SensorError<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf).map_err(SensorError::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<(), SensorError<I2C::Error>> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.address, &[reg, hi, lo]).map_err(SensorError::Bus)
    }

    fn update_config(&mut self, mask: u16, bits: u16) -> Result<(), SensorError<I2C::Error>> {
        let config = self.read_reg(REG_CONFIG)?;
        self.write_reg(REG_CONFIG, (config & !mask) | (bits & mask))
    }
}

impl<I2C: I2c> SenseChip for Ina3221<I2C> {
    type Error = SensorError<I2C::Error>;

    fn shunt_voltage_uv(&mut self, ch: Channel) -> Result<f32, Self::Error> {
        let raw = self.read_reg(shunt_reg(ch))?;
        Ok(decode_value(raw) as f32 * SHUNT_LSB_UV)
    }

    fn bus_voltage_v(&mut self, ch: Channel) -> Result<f32, Self::Error> {
        let raw = self.read_reg(bus_reg(ch))?;
        Ok(decode_value(raw) as f32 * BUS_LSB_MV / 1000.0)
    }

    /// Shunt voltage divided by the shunt resistance, in units of 100 mA.
    fn current(&mut self, ch: Channel) -> Result<f32, Self::Error> {
        let shunt_uv = self.shunt_voltage_uv(ch)?;
        Ok(shunt_uv / self.shunt_mohm[ch.index()] as f32 / CURRENT_SCALE_TO_MA)
    }

    fn set_channel_enabled(&mut self, ch: Channel, enabled: bool) -> Result<(), Self::Error> {
        let bit = enable_bit(ch);
        self.update_config(bit, if enabled { bit } else { 0 })
    }

    fn set_averaging(&mut self, mode: AveragingMode) -> Result<(), Self::Error> {
        self.update_config(CONFIG_AVG_MASK, avg_code(mode) << CONFIG_AVG_SHIFT)
    }

    fn set_alert_limits(&mut self, ch: Channel, warn_ma: i32, crit_ma: i32) -> Result<(), Self::Error> {
        let shunt = self.shunt_mohm[ch.index()];
        self.write_reg(warn_alert_reg(ch), alert_limit_value(warn_ma, shunt))?;
        self.write_reg(crit_alert_reg(ch), alert_limit_value(crit_ma, shunt))
    }
}
