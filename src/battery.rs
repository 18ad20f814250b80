// Battery voltage through the resistor divider on the ADC.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;

/// Reads averaged per measurement.
pub const BATTERY_SAMPLES: u32 = 5;
/// Full-scale raw value of the 12-bit ADC.
pub const ADC_FULL_SCALE: f32 = 4095.0;

/// Raw access to the battery divider channel.
pub trait BatterySense {
    fn read_raw(&mut self) -> anyhow::Result<u16>;
}

pub struct BatteryMonitor<S> {
    sense: S,
    scale: f32,
}

impl<S: BatterySense> BatteryMonitor<S> {
    /// `scale` is the volts represented by a full-scale reading.
    pub fn new(sense: S, scale: f32) -> Self {
        BatteryMonitor { sense, scale }
    }

    /// Averages [`BATTERY_SAMPLES`] reads. Failed reads are skipped; if all
    /// fail the error of the last one is returned.
    pub fn voltage(&mut self) -> anyhow::Result<f32> {
        let mut sum = 0u32;
        let mut count = 0u32;
        let mut last_err = None;
        for _ in 0..BATTERY_SAMPLES {
            match self.sense.read_raw() {
                Ok(raw) => {
                    sum += raw as u32;
                    count += 1;
                }
                Err(e) => {
                    debug!("battery read failed: {:?}", e);
                    last_err = Some(e);
                }
            }
        }
        match (count, last_err) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(anyhow::anyhow!("no battery samples")),
            _ => Ok(sum as f32 / count as f32 * self.scale / ADC_FULL_SCALE),
        }
    }
}

pub fn is_low(voltage: f32, threshold: f32) -> bool {
    voltage < threshold
}
