// Setup menu: channel enables, averaging mode and the start action.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;

use crate::channels::{AveragingMode, Channel};
use crate::input::Buttons;

/// Highlighted menu row; `next` walks them in order and wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuRow {
    Channel(Channel),
    Averaging,
    Start,
}

impl MenuRow {
    pub const FIRST: MenuRow = MenuRow::Channel(Channel::One);

    pub fn next(self) -> Self {
        match self {
            MenuRow::Channel(Channel::One) => MenuRow::Channel(Channel::Two),
            MenuRow::Channel(Channel::Two) => MenuRow::Channel(Channel::Three),
            MenuRow::Channel(Channel::Three) => MenuRow::Averaging,
            MenuRow::Averaging => MenuRow::Start,
            MenuRow::Start => MenuRow::FIRST,
        }
    }
}

/// Settings collected by the menu and frozen for one logging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    pub enabled: [bool; 3],
    pub averaging: AveragingMode,
    pub storage_available: bool,
}

impl LoggerConfig {
    pub fn new(storage_available: bool) -> Self {
        LoggerConfig { enabled: [true; 3], averaging: AveragingMode::X1, storage_available }
    }

    pub fn is_enabled(&self, ch: Channel) -> bool {
        self.enabled[ch.index()]
    }

    pub fn any_enabled(&self) -> bool {
        self.enabled.iter().any(|&e| e)
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL.into_iter().filter(move |ch| self.is_enabled(*ch))
    }

    pub fn first_enabled(&self) -> Option<Channel> {
        self.enabled_channels().next()
    }

    /// The enabled channel after `current`, wrapping to the lowest one.
    pub fn next_enabled_after(&self, current: Channel) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|ch| *ch > current && self.is_enabled(*ch))
            .or_else(|| self.first_enabled())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    Stay,
    Start,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupMenu {
    pub selected: MenuRow,
    pub config: LoggerConfig,
    /// Set while every channel is disabled; blocks the start action.
    pub error: bool,
}

impl SetupMenu {
    pub fn new(config: LoggerConfig) -> Self {
        let mut menu = SetupMenu { selected: MenuRow::FIRST, config, error: false };
        menu.error = !menu.config.any_enabled();
        menu
    }

    /// Back to the first row, keeping the previous session's settings.
    pub fn reopen(&mut self) {
        self.selected = MenuRow::FIRST;
        self.error = !self.config.any_enabled();
    }

    pub fn can_start(&self) -> bool {
        self.config.any_enabled()
    }

    /// One poll tick. `next` moves the cursor first, then `activate` acts on
    /// the (possibly new) row.
    pub fn handle(&mut self, buttons: Buttons) -> MenuOutcome {
        if buttons.next {
            self.selected = self.selected.next();
        }
        let mut outcome = MenuOutcome::Stay;
        if buttons.activate {
            match self.selected {
                MenuRow::Channel(ch) => {
                    let enabled = &mut self.config.enabled[ch.index()];
                    *enabled = !*enabled;
                    info!("CH{} {}", ch, if *enabled { "enabled" } else { "disabled" });
                }
                MenuRow::Averaging => {
                    self.config.averaging = self.config.averaging.cycle();
                    info!("Averaging set to {}", self.config.averaging.samples());
                }
                MenuRow::Start => {
                    if self.can_start() {
                        outcome = MenuOutcome::Start;
                    } else {
                        warn!("Start refused: no channel enabled");
                    }
                }
            }
        }
        self.error = !self.config.any_enabled();
        outcome
    }
}
