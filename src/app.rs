// Application state: setup menu, logging session and the running display.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::path::PathBuf;

use crate::boot::BootReport;
use crate::channels::{Channel, ChannelReadings, SenseChip};
use crate::clock::{Clock, Elapsed};
use crate::config::LoggerSettings;
use crate::displayctl::{Backlight, BacklightDriver};
use crate::input::Buttons;
use crate::menu::{LoggerConfig, MenuOutcome, SetupMenu};
use crate::presenter::{menu_screen, readout_screen, starting_screen, Screen};
use crate::storage::{data_row, SessionFile};

/// Input stays suppressed this long after a session starts.
pub const START_SUPPRESS_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Setup,
    Logging,
}

/// What one main-loop step did, for the caller's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Idle,
    /// The menu asked for a session; call [`PowerLogger::start_session`].
    StartRequested,
    Sampled,
    ChannelChanged,
    Stopped,
    Woke,
}

pub struct PowerLogger<B> {
    settings: LoggerSettings,
    menu: SetupMenu,
    readings: ChannelReadings,
    mode: Mode,
    display_channel: Channel,
    backlight: Backlight<B>,
    storage_root: PathBuf,
    session: Option<SessionFile>,
    clock: Clock,
    battery_v: f32,
    session_start_ms: u32,
    last_sample_ms: u32,
}

impl<B: BacklightDriver> PowerLogger<B> {
    pub fn new(settings: LoggerSettings, boot: &BootReport, storage_root: PathBuf, backlight: Backlight<B>) -> Self {
        PowerLogger {
            settings,
            menu: SetupMenu::new(LoggerConfig::new(boot.storage)),
            readings: ChannelReadings::new(),
            mode: Mode::Setup,
            display_channel: Channel::One,
            backlight,
            storage_root,
            session: None,
            clock: boot.clock,
            battery_v: boot.battery_v,
            session_start_ms: 0,
            last_sample_ms: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn menu(&self) -> &SetupMenu {
        &self.menu
    }

    pub fn readings(&self) -> &ChannelReadings {
        &self.readings
    }

    pub fn display_channel(&self) -> Channel {
        self.display_channel
    }

    pub fn session(&self) -> Option<&SessionFile> {
        self.session.as_ref()
    }

    pub fn backlight(&self) -> &Backlight<B> {
        &self.backlight
    }

    /// One poll of the setup menu.
    pub fn setup_step(&mut self, buttons: Buttons) -> StepEvent {
        if buttons.any() {
            self.backlight.wake();
        }
        match self.menu.handle(buttons) {
            MenuOutcome::Start => StepEvent::StartRequested,
            MenuOutcome::Stay => StepEvent::Idle,
        }
    }

    /// Applies the menu settings to the chip, zeroes the accumulators,
    /// creates the session file and switches to logging. The caller keeps
    /// input suppressed for [`START_SUPPRESS_MS`] around this.
    pub fn start_session<C: SenseChip>(&mut self, chip: &mut C, now_ms: u32) {
        let config = self.menu.config;
        if let Err(e) = chip.set_averaging(config.averaging) {
            warn!("Averaging {} not applied: {:?}", config.averaging.samples(), e);
        }
        for ch in Channel::ALL {
            if let Err(e) = chip.set_channel_enabled(ch, config.is_enabled(ch)) {
                warn!("CH{} enable not applied: {:?}", ch, e);
            }
        }
        self.readings.clear();

        self.session = None;
        if config.storage_available {
            let name = self.clock.session_file_name(now_ms);
            match SessionFile::create(&self.storage_root, &name, &config) {
                Ok(file) => self.session = Some(file),
                Err(e) => warn!("Session file unavailable, not logging to SD: {}", e),
            }
        }

        if !config.is_enabled(self.display_channel) {
            if let Some(ch) = config.first_enabled() {
                self.display_channel = ch;
            }
        }
        self.session_start_ms = now_ms;
        self.last_sample_ms = now_ms;
        self.mode = Mode::Logging;
        self.backlight.wake();
        info!(
            "Session started: channels {:?}, averaging {}, display CH{}",
            config.enabled,
            config.averaging.samples(),
            self.display_channel
        );
    }

    /// Waits out the start confirmation with `settle`, which returns the time
    /// input is released, and starts the session at that time.
    pub fn start_session_after<C: SenseChip>(&mut self, chip: &mut C, settle: impl FnOnce() -> u32) {
        let now_ms = settle();
        self.start_session(chip, now_ms);
    }

    /// Latest battery measurement for the readout. A failed read keeps the
    /// previous value.
    pub fn update_battery(&mut self, reading: anyhow::Result<f32>) {
        match reading {
            Ok(volts) => self.battery_v = volts,
            Err(e) => debug!("Battery read failed, keeping {:.2} V: {:?}", self.battery_v, e),
        }
    }

    /// One main-loop iteration while logging: sample when the interval is
    /// due, handle the buttons, then let the backlight time out.
    pub fn logging_step<C: SenseChip>(&mut self, chip: &mut C, buttons: Buttons, now_ms: u32, last_activity_ms: u32) -> StepEvent {
        let mut event = StepEvent::Idle;
        let interval = self.settings.sample_interval_ms;
        if now_ms.wrapping_sub(self.last_sample_ms) >= interval {
            self.last_sample_ms = now_ms;
            self.readings.sample(chip, &self.menu.config.enabled, interval);
            self.write_row(now_ms);
            event = StepEvent::Sampled;
        }

        if self.backlight.is_awake() {
            if buttons.next {
                if let Some(ch) = self.menu.config.next_enabled_after(self.display_channel) {
                    self.display_channel = ch;
                    debug!("Showing CH{}", ch);
                    event = StepEvent::ChannelChanged;
                }
            }
            if buttons.activate {
                self.stop_session();
                return StepEvent::Stopped;
            }
        } else if buttons.any() {
            self.backlight.wake();
            return StepEvent::Woke;
        }

        self.backlight.update(now_ms, last_activity_ms);
        event
    }

    fn write_row(&mut self, now_ms: u32) {
        if let Some(file) = &self.session {
            let row = data_row(
                &self.clock.row_date(now_ms),
                &self.clock.row_time(now_ms),
                &self.menu.config,
                &self.readings,
            );
            if let Err(e) = file.append(&row) {
                warn!("{}", e);
            }
        }
    }

    /// Ends the session and reopens the menu with the same settings.
    pub fn stop_session(&mut self) {
        info!("Session stopped after {}", Elapsed::between(self.session_start_ms, self.last_sample_ms));
        self.readings.clear();
        self.session = None;
        self.mode = Mode::Setup;
        self.menu.reopen();
    }

    /// Screen for the current mode at `now_ms`.
    pub fn screen(&self, now_ms: u32) -> Screen {
        match self.mode {
            Mode::Setup => menu_screen(&self.menu),
            Mode::Logging => readout_screen(
                Elapsed::between(self.session_start_ms, now_ms),
                self.display_channel,
                self.readings.get(self.display_channel),
                self.battery_v,
            ),
        }
    }

    pub fn starting_screen(&self) -> Screen {
        starting_screen(&self.menu.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::tests::ScriptedAdc;
    use crate::battery::BatteryMonitor;
    use crate::channels::tests::FixedChip;
    use crate::channels::AveragingMode;
    use crate::displayctl::tests::RecordingBacklight;
    use crate::displayctl::{BACKLIGHT_DIM, BACKLIGHT_FULL};
    use chrono::NaiveDate;
    use std::fs;

    const NEXT: Buttons = Buttons { next: true, activate: false };
    const ACTIVATE: Buttons = Buttons { next: false, activate: true };
    const NONE: Buttons = Buttons { next: false, activate: false };

    fn report(storage: bool) -> BootReport {
        let wall = NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|d| d.and_hms_opt(14, 3, 9)).unwrap();
        BootReport {
            storage,
            ip: None,
            clock: Clock::synced(wall, 0),
            battery_v: 3.9,
            low_battery: false,
        }
    }

    fn logger(storage: bool, root: PathBuf) -> PowerLogger<RecordingBacklight> {
        let backlight = Backlight::new(RecordingBacklight::default()).unwrap();
        PowerLogger::new(LoggerSettings::default(), &report(storage), root, backlight)
    }

    fn chip() -> FixedChip {
        FixedChip { bus_v: [5.0, 3.3, 12.0], current: [1.0, 2.0, 0.5], ..Default::default() }
    }

    fn start(app: &mut PowerLogger<RecordingBacklight>, chip: &mut FixedChip, now: u32) {
        // cursor on START
        for _ in 0..4 {
            app.setup_step(NEXT);
        }
        assert_eq!(app.setup_step(ACTIVATE), StepEvent::StartRequested);
        app.start_session(chip, now);
    }

    #[test]
    fn start_applies_menu_settings_to_chip() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        app.setup_step(ACTIVATE); // CH1 off
        start(&mut app, &mut chip, 1000);
        assert_eq!(app.mode(), Mode::Logging);
        assert_eq!(chip.enabled, [Some(false), Some(true), Some(true)]);
        assert_eq!(chip.averaging, Some(AveragingMode::X1));
        assert_eq!(app.display_channel(), Channel::Two);
        assert!(app.session().is_none());
    }

    #[test]
    fn samples_on_interval_only() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        assert_eq!(app.logging_step(&mut chip, NONE, 199, 0), StepEvent::Idle);
        assert_eq!(app.logging_step(&mut chip, NONE, 200, 0), StepEvent::Sampled);
        assert_eq!(app.logging_step(&mut chip, NONE, 300, 0), StepEvent::Idle);
        assert_eq!(app.logging_step(&mut chip, NONE, 400, 0), StepEvent::Sampled);
        assert_eq!(chip.reads, [2, 2, 2]);
        let expected = 100.0 * 400.0 / 3_600_000.0;
        assert!((app.readings().get(Channel::One).capacity_mah - expected).abs() < 1e-6);
    }

    #[test]
    fn next_cycles_enabled_channels_only() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        app.setup_step(NEXT);
        app.setup_step(ACTIVATE); // CH2 off
        app.setup_step(NEXT);
        app.setup_step(NEXT);
        app.setup_step(NEXT);
        assert_eq!(app.setup_step(ACTIVATE), StepEvent::StartRequested);
        app.start_session(&mut chip, 0);
        assert_eq!(app.display_channel(), Channel::One);
        assert_eq!(app.logging_step(&mut chip, NEXT, 10, 10), StepEvent::ChannelChanged);
        assert_eq!(app.display_channel(), Channel::Three);
        app.logging_step(&mut chip, NEXT, 20, 20);
        assert_eq!(app.display_channel(), Channel::One);
    }

    #[test]
    fn activate_stops_and_reopens_menu() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        app.logging_step(&mut chip, NONE, 200, 0);
        assert_eq!(app.logging_step(&mut chip, ACTIVATE, 250, 250), StepEvent::Stopped);
        assert_eq!(app.mode(), Mode::Setup);
        assert_eq!(app.menu().selected, crate::menu::MenuRow::FIRST);
        assert_eq!(app.readings(), &ChannelReadings::new());
    }

    #[test]
    fn menu_toggles_before_start_leave_accumulators_at_zero() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        app.setup_step(ACTIVATE); // CH1 off
        app.setup_step(ACTIVATE); // CH1 on
        assert_eq!(app.readings(), &ChannelReadings::new());
        start(&mut app, &mut chip, 0);
        assert_eq!(app.readings(), &ChannelReadings::new());
        assert_eq!(app.logging_step(&mut chip, NONE, 200, 0), StepEvent::Sampled);
        let ch1 = app.readings().get(Channel::One);
        assert!((ch1.capacity_mah - 100.0 * 200.0 / 3_600_000.0).abs() < 1e-6);
        assert!((ch1.energy_mwh - 500.0 * 200.0 / 3_600_000.0).abs() < 1e-6);
    }

    #[test]
    fn session_clock_starts_after_the_start_confirmation() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        for _ in 0..4 {
            app.setup_step(NEXT);
        }
        assert_eq!(app.setup_step(ACTIVATE), StepEvent::StartRequested);
        let requested_at = 5_000;
        app.start_session_after(&mut chip, || requested_at + START_SUPPRESS_MS);
        assert_eq!(app.mode(), Mode::Logging);
        assert_eq!(app.screen(6_000).texts()[0], "T: 0:00:00:00");
        assert_eq!(app.logging_step(&mut chip, NONE, 6_199, 6_000), StepEvent::Idle);
        assert_eq!(app.logging_step(&mut chip, NONE, 6_200, 6_000), StepEvent::Sampled);
        assert_eq!(app.screen(7_000).texts()[0], "T: 0:00:00:01");
    }

    #[test]
    fn battery_readout_tracks_new_measurements() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        app.logging_step(&mut chip, NONE, 200, 0);
        assert_eq!(app.screen(200).texts()[7], "CH:1   B:3.90");

        let adc = ScriptedAdc { values: (0..5).map(|_| Ok(2548)).collect() };
        let mut monitor = BatteryMonitor::new(adc, 5.8);
        app.logging_step(&mut chip, NONE, 36_000_000, 0);
        app.update_battery(monitor.voltage());
        assert_eq!(app.screen(36_000_000).texts()[7], "CH:1   B:3.61");

        app.update_battery(Err(anyhow::anyhow!("adc timeout")));
        assert_eq!(app.screen(36_000_200).texts()[7], "CH:1   B:3.61");
    }

    #[test]
    fn display_sleeps_and_first_press_only_wakes() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        app.logging_step(&mut chip, NONE, 30_000, 0);
        assert!(app.backlight().is_awake());
        app.logging_step(&mut chip, NONE, 30_001, 0);
        assert!(!app.backlight().is_awake());

        assert_eq!(app.logging_step(&mut chip, ACTIVATE, 31_000, 31_000), StepEvent::Woke);
        assert_eq!(app.mode(), Mode::Logging);
        assert!(app.backlight().is_awake());
        let duties = &app.backlight().driver().duties;
        assert_eq!(duties.last(), Some(&BACKLIGHT_FULL));
        assert!(duties.contains(&BACKLIGHT_DIM));
    }

    #[test]
    fn session_file_is_written_when_storage_is_available() {
        let root = std::env::temp_dir().join(format!("power-logger-app-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let mut app = logger(true, root.clone());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        let path = app.session().map(|s| s.path().to_path_buf()).unwrap();
        assert_eq!(path, root.join("2024-March-05_14-03-09.txt"));
        app.logging_step(&mut chip, NONE, 200, 0);
        app.logging_step(&mut chip, NONE, 400, 0);
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("24/03/05,14:03:09:200,5.00,100.00,500.00"));
        assert!(lines.iter().all(|l| l.split(',').count() == 17));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn readout_follows_display_channel() {
        let mut app = logger(false, std::env::temp_dir());
        let mut chip = chip();
        start(&mut app, &mut chip, 0);
        app.logging_step(&mut chip, NONE, 200, 0);
        let texts = app.screen(61_200).texts();
        assert_eq!(texts[0], "T: 0:00:01:01");
        assert_eq!(texts[7], "CH:1   B:3.90");
    }
}
