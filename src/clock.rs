// Wall clock seeded from NTP plus elapsed-time helpers.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::fmt;

/// Session file used when the wall clock was never synchronised.
pub const FALLBACK_FILE_NAME: &str = "/log.txt";

/// Wall clock anchored to the monotonic millisecond counter.
///
/// The wall time is captured once at NTP sync together with the counter
/// value. Later readings add the counter delta. The counter is 32 bit and
/// all arithmetic on it wraps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    base: NaiveDateTime,
    base_ms: u32,
    synced: bool,
}

impl Clock {
    /// Clock that starts at the Unix epoch at counter value 0.
    pub fn unsynced() -> Self {
        Clock { base: DateTime::<Utc>::UNIX_EPOCH.naive_utc(), base_ms: 0, synced: false }
    }

    pub fn synced(wall: NaiveDateTime, at_ms: u32) -> Self {
        Clock { base: wall, base_ms: at_ms, synced: true }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn now(&self, now_ms: u32) -> NaiveDateTime {
        self.base + TimeDelta::milliseconds(now_ms.wrapping_sub(self.base_ms) as i64)
    }

    /// Milliseconds since the sync point, modulo one second.
    pub fn subsecond_ms(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.base_ms) % 1000
    }

    /// `/{year}-{month name}-{day}_{hour}-{minute}-{second}.txt`, or
    /// [`FALLBACK_FILE_NAME`] without a synchronised clock.
    pub fn session_file_name(&self, now_ms: u32) -> String {
        if !self.synced {
            return FALLBACK_FILE_NAME.to_string();
        }
        format!("/{}.txt", self.now(now_ms).format("%Y-%B-%d_%H-%M-%S"))
    }

    /// Date column of a log row (`YY/MM/DD`).
    pub fn row_date(&self, now_ms: u32) -> String {
        self.now(now_ms).format("%y/%m/%d").to_string()
    }

    /// Time column of a log row: `HH:MM:SS:` followed by the unpadded
    /// sub-second millisecond count.
    pub fn row_time(&self, now_ms: u32) -> String {
        format!("{}:{}", self.now(now_ms).format("%H:%M:%S"), self.subsecond_ms(now_ms))
    }
}

/// Session duration split into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Elapsed {
    pub fn from_millis(elapsed_ms: u32) -> Self {
        let total_seconds = elapsed_ms / 1000;
        let total_minutes = total_seconds / 60;
        let total_hours = total_minutes / 60;
        Elapsed {
            days: total_hours / 24,
            hours: total_hours % 24,
            minutes: total_minutes % 60,
            seconds: total_seconds % 60,
        }
    }

    pub fn between(start_ms: u32, now_ms: u32) -> Self {
        Self::from_millis(now_ms.wrapping_sub(start_ms))
    }
}

impl fmt::Display for Elapsed {
    // Days are printed as-is; the other fields get a leading zero below 10.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}:{:02}", self.days, self.hours, self.minutes, self.seconds)
    }
}
