// Three-channel power logger: INA3221 sampling, TFT readout and CSV logging.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

pub mod app;
pub mod battery;
pub mod boot;
pub mod channels;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod displayctl;
pub mod ina3221;
pub mod input;
pub mod menu;
pub mod presenter;
pub mod storage;

pub use app::{Mode, PowerLogger, StepEvent};
pub use boot::{run_boot, BootOutcome, BootPlatform, BootReport};
pub use channels::{AveragingMode, Channel, ChannelReading, ChannelReadings, SenseChip};
pub use clock::{Clock, Elapsed};
pub use config::{LoggerSettings, CONFIG};
pub use displayctl::{Backlight, BacklightDriver, DisplayPanel};
pub use input::{Button, Buttons, InputController};
pub use menu::{LoggerConfig, SetupMenu};
