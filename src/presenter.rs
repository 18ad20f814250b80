// Text layout of the boot, menu and live readout screens.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use embedded_graphics::pixelcolor::{Rgb565, RgbColor};

use crate::channels::{Channel, ChannelReading};
use crate::clock::Elapsed;
use crate::menu::{LoggerConfig, MenuRow, SetupMenu};

pub const BACKGROUND: Rgb565 = Rgb565::new(0, 0, 7);
pub const TEXT: Rgb565 = Rgb565::WHITE;
pub const ALERT: Rgb565 = Rgb565::RED;
pub const GOOD: Rgb565 = Rgb565::GREEN;
pub const TIME: Rgb565 = Rgb565::YELLOW;

/// Column padding thresholds: values below each bound get one more space
/// than the next. Values at or above the last bound, and negative values,
/// get no padding.
pub const PAD_BOUNDS: [f32; 4] = [10.0, 100.0, 1000.0, 10000.0];
const PADDING: [&str; 4] = ["   ", "  ", " ", ""];

/// Leading spaces that right-align a value with 1 to 4 integer digits.
pub fn pad_for(value: f32) -> &'static str {
    if value < 0.0 {
        return "";
    }
    PAD_BOUNDS
        .iter()
        .position(|bound| value < *bound)
        .map(|i| PADDING[i])
        .unwrap_or("")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    Small,
    Large,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub color: Rgb565,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub spans: Vec<Span>,
    pub size: FontSize,
}

impl Line {
    pub fn new(size: FontSize) -> Self {
        Line { spans: Vec::new(), size }
    }

    pub fn large(text: impl Into<String>, color: Rgb565) -> Self {
        Line::new(FontSize::Large).push(text, color)
    }

    pub fn small(text: impl Into<String>, color: Rgb565) -> Self {
        Line::new(FontSize::Small).push(text, color)
    }

    pub fn blank(size: FontSize) -> Self {
        Line::new(size)
    }

    pub fn push(mut self, text: impl Into<String>, color: Rgb565) -> Self {
        self.spans.push(Span { text: text.into(), color });
        self
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// A full screen, drawn top to bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screen {
    pub lines: Vec<Line>,
}

impl Screen {
    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(Line::text).collect()
    }
}

fn cursor(selected: bool) -> &'static str {
    if selected {
        ">"
    } else {
        " "
    }
}

fn channel_row(prefix: &str, ch: Channel, enabled: bool) -> Line {
    let line = Line::large(format!("{}CH{}: ", prefix, ch), TEXT);
    if enabled {
        line.push(" ENABLE", TEXT)
    } else {
        line.push("DISABLE", ALERT)
    }
}

fn averaging_row(prefix: &str, config: &LoggerConfig) -> Line {
    Line::large(format!("{}AVG: {:>7}", prefix, config.averaging.samples()), TEXT)
}

/// Interactive setup menu with the row cursor.
pub fn menu_screen(menu: &SetupMenu) -> Screen {
    let mut lines = Vec::with_capacity(8);
    lines.push(Line::large(if menu.error { "Setup: ERROR" } else { "Setup:      " }, ALERT));
    lines.push(Line::blank(FontSize::Large));
    for ch in Channel::ALL {
        let prefix = cursor(menu.selected == MenuRow::Channel(ch));
        lines.push(channel_row(prefix, ch, menu.config.is_enabled(ch)));
    }
    lines.push(averaging_row(cursor(menu.selected == MenuRow::Averaging), &menu.config));
    lines.push(Line::blank(FontSize::Large));
    lines.push(Line::large(format!("{}START", cursor(menu.selected == MenuRow::Start)), TEXT));
    Screen { lines }
}

/// Confirmation shown while a session is being started.
pub fn starting_screen(config: &LoggerConfig) -> Screen {
    let mut lines = Vec::with_capacity(8);
    lines.push(Line::large("Setup: ", ALERT));
    lines.push(Line::blank(FontSize::Large));
    for ch in Channel::ALL {
        lines.push(channel_row(" ", ch, config.is_enabled(ch)));
    }
    lines.push(averaging_row(" ", config));
    lines.push(Line::blank(FontSize::Large));
    lines.push(Line::large(" STARTING ...", GOOD));
    Screen { lines }
}

/// Live values of one channel.
pub fn readout_screen(elapsed: Elapsed, channel: Channel, reading: &ChannelReading, battery_v: f32) -> Screen {
    let power = reading.power_mw();
    let lines = vec![
        Line::large(format!("T: {}", elapsed), TIME),
        Line::blank(FontSize::Large),
        Line::large(format!("V:       {:.2}", reading.load_voltage_v), TEXT),
        Line::large(format!("mA:   {}{:.2}", pad_for(reading.current_ma), reading.current_ma), TEXT),
        Line::large(format!("mW:   {}{:.2}", pad_for(power), power), TEXT),
        Line::large(format!("mWh:  {}{:.2}", pad_for(reading.energy_mwh), reading.energy_mwh), TEXT),
        Line::large(format!("mAh:  {}{:.2}", pad_for(reading.capacity_mah), reading.capacity_mah), TEXT),
        Line::large(format!("CH:{}   B:{:.2}", channel, battery_v), ALERT),
    ];
    Screen { lines }
}
