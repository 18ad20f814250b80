// Per-channel readings of the INA3221 and the energy/capacity accumulators.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::fmt;

/// The driver reports current in a chip-native unit; this brings it to mA.
pub const CURRENT_SCALE_TO_MA: f32 = 100.0;

/// Milliseconds per hour, the divisor of both integrals.
pub const MS_PER_HOUR: f32 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    One,
    Two,
    Three,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::One, Channel::Two, Channel::Three];

    /// 1-based channel number as printed on the board.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
            Channel::Three => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Channel> {
        match n {
            1 => Some(Channel::One),
            2 => Some(Channel::Two),
            3 => Some(Channel::Three),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Sense-chip internal averaging count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMode {
    X1,
    X4,
    X16,
    X64,
    X128,
}

impl AveragingMode {
    pub fn samples(self) -> u16 {
        match self {
            AveragingMode::X1 => 1,
            AveragingMode::X4 => 4,
            AveragingMode::X16 => 16,
            AveragingMode::X64 => 64,
            AveragingMode::X128 => 128,
        }
    }

    /// Next mode in menu order, wrapping 128 -> 1.
    pub fn cycle(self) -> Self {
        match self {
            AveragingMode::X1 => AveragingMode::X4,
            AveragingMode::X4 => AveragingMode::X16,
            AveragingMode::X16 => AveragingMode::X64,
            AveragingMode::X64 => AveragingMode::X128,
            AveragingMode::X128 => AveragingMode::X1,
        }
    }
}

impl Default for AveragingMode {
    fn default() -> Self {
        AveragingMode::X1
    }
}

/// Register-level access to a three-channel current/voltage sense chip.
pub trait SenseChip {
    type Error: fmt::Debug;

    /// Shunt voltage in µV.
    fn shunt_voltage_uv(&mut self, ch: Channel) -> Result<f32, Self::Error>;
    /// Bus voltage in V.
    fn bus_voltage_v(&mut self, ch: Channel) -> Result<f32, Self::Error>;
    /// Current in the chip-native unit (see [`CURRENT_SCALE_TO_MA`]).
    fn current(&mut self, ch: Channel) -> Result<f32, Self::Error>;
    fn set_channel_enabled(&mut self, ch: Channel, enabled: bool) -> Result<(), Self::Error>;
    fn set_averaging(&mut self, mode: AveragingMode) -> Result<(), Self::Error>;
    /// Over-current alert limits in mA; a negative value clears the limit.
    fn set_alert_limits(&mut self, ch: Channel, warn_ma: i32, crit_ma: i32) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelReading {
    pub shunt_voltage_uv: f32,
    pub bus_voltage_v: f32,
    pub load_voltage_v: f32,
    pub current_ma: f32,
    pub energy_mwh: f32,
    pub capacity_mah: f32,
}

impl ChannelReading {
    pub fn power_mw(&self) -> f32 {
        self.load_voltage_v * self.current_ma
    }

    /// Folds one sample into the reading. Energy and capacity use a
    /// left-rectangle step of `interval_ms`.
    pub fn apply_sample(&mut self, shunt_voltage_uv: f32, bus_voltage_v: f32, current_ma: f32, interval_ms: u32) {
        self.shunt_voltage_uv = shunt_voltage_uv;
        self.bus_voltage_v = bus_voltage_v;
        self.current_ma = current_ma;
        self.load_voltage_v = bus_voltage_v + shunt_voltage_uv / 1_000_000.0;
        let dt = interval_ms as f32;
        self.energy_mwh += self.load_voltage_v * self.current_ma * dt / MS_PER_HOUR;
        self.capacity_mah += self.current_ma * dt / MS_PER_HOUR;
    }
}

/// Readings of all three channels, indexed by [`Channel`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelReadings {
    rec: [ChannelReading; 3],
}

impl ChannelReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ch: Channel) -> &ChannelReading {
        &self.rec[ch.index()]
    }

    pub fn clear(&mut self) {
        self.rec = Default::default();
    }

    /// Reads every enabled channel and integrates it. A channel whose read
    /// fails keeps its previous reading and accumulators.
    pub fn sample<C: SenseChip>(&mut self, chip: &mut C, enabled: &[bool; 3], interval_ms: u32) {
        for ch in Channel::ALL {
            if !enabled[ch.index()] {
                continue;
            }
            match read_channel(chip, ch) {
                Ok((shunt_uv, bus_v, current_ma)) => {
                    self.rec[ch.index()].apply_sample(shunt_uv, bus_v, current_ma, interval_ms);
                }
                Err(e) => {
                    debug!("CH{} read failed, keeping last reading: {:?}", ch, e);
                }
            }
        }
    }
}

fn read_channel<C: SenseChip>(chip: &mut C, ch: Channel) -> Result<(f32, f32, f32), C::Error> {
    let shunt_uv = chip.shunt_voltage_uv(ch)?;
    let bus_v = chip.bus_voltage_v(ch)?;
    let current_ma = chip.current(ch)? * CURRENT_SCALE_TO_MA;
    Ok((shunt_uv, bus_v, current_ma))
}
