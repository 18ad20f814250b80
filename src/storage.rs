// CSV session log on the SD card.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::channels::ChannelReadings;
use crate::menu::LoggerConfig;

const LINE_END: &str = "\r\n";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create {path}: {source}")]
    Create { path: String, source: io::Error },
    #[error("cannot append to {path}: {source}")]
    Append { path: String, source: io::Error },
}

/// `date,time` plus five columns per enabled channel, ascending.
pub fn header_line(config: &LoggerConfig) -> String {
    let mut line = String::from("date,time");
    for ch in config.enabled_channels() {
        line.push_str(&format!(
            ",load voltage {n},current mA {n},power mW {n},energy mWh {n},capacity mAh {n}",
            n = ch
        ));
    }
    line
}

/// One data row matching [`header_line`] for the same config.
pub fn data_row(date: &str, time: &str, config: &LoggerConfig, readings: &ChannelReadings) -> String {
    let mut line = format!("{},{}", date, time);
    for ch in config.enabled_channels() {
        let r = readings.get(ch);
        line.push_str(&format!(
            ",{:.2},{:.2},{:.2},{:.2},{:.2}",
            r.load_voltage_v,
            r.current_ma,
            r.power_mw(),
            r.energy_mwh,
            r.capacity_mah
        ));
    }
    line
}

/// Log file of one session. Each append reopens the file, writes one line
/// and flushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Creates (or truncates) `name` under `root` and writes the header.
    pub fn create(root: &Path, name: &str, config: &LoggerConfig) -> Result<Self, StorageError> {
        let path = root.join(name.trim_start_matches('/'));
        let display = path.display().to_string();
        let mut file = File::create(&path).map_err(|source| StorageError::Create { path: display.clone(), source })?;
        write_line(&mut file, &header_line(config)).map_err(|source| StorageError::Create { path: display.clone(), source })?;
        info!("Logging to {}", display);
        Ok(SessionFile { path })
    }

    pub fn append(&self, line: &str) -> Result<(), StorageError> {
        let err = |source: io::Error| StorageError::Append { path: self.path.display().to_string(), source };
        let mut file = OpenOptions::new().append(true).open(&self.path).map_err(err)?;
        write_line(&mut file, line).map_err(err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_line(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(LINE_END.as_bytes())?;
    file.flush()
}
