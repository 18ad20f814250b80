// Drives a whole logging session through fake hardware.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

use power_logger::presenter::menu_screen;
use power_logger::{
    AveragingMode, Backlight, BacklightDriver, BootReport, Buttons, Channel, Clock, InputController, LoggerSettings,
    Mode, PowerLogger, SenseChip, StepEvent, Button,
};

const NEXT: Buttons = Buttons { next: true, activate: false };
const ACTIVATE: Buttons = Buttons { next: false, activate: true };
const NONE: Buttons = Buttons { next: false, activate: false };

#[derive(Default)]
struct BenchChip {
    enabled: [bool; 3],
    averaging: Option<AveragingMode>,
}

impl SenseChip for BenchChip {
    type Error = ();

    fn shunt_voltage_uv(&mut self, ch: Channel) -> Result<f32, ()> {
        assert!(self.enabled[ch.index()], "read from disabled CH{}", ch);
        Ok(20_000.0)
    }

    fn bus_voltage_v(&mut self, ch: Channel) -> Result<f32, ()> {
        Ok(ch.number() as f32 * 1.5)
    }

    fn current(&mut self, _ch: Channel) -> Result<f32, ()> {
        Ok(2.0)
    }

    fn set_channel_enabled(&mut self, ch: Channel, enabled: bool) -> Result<(), ()> {
        self.enabled[ch.index()] = enabled;
        Ok(())
    }

    fn set_averaging(&mut self, mode: AveragingMode) -> Result<(), ()> {
        self.averaging = Some(mode);
        Ok(())
    }

    fn set_alert_limits(&mut self, _ch: Channel, _warn_ma: i32, _crit_ma: i32) -> Result<(), ()> {
        Ok(())
    }
}

struct NoBacklight;

impl BacklightDriver for NoBacklight {
    fn set_duty(&mut self, _duty: u8) -> anyhow::Result<()> {
        Ok(())
    }
}

fn temp_root() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("power-logger-e2e-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn channels_one_and_three_with_averaging_sixteen() {
    let root = temp_root();
    let wall = NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|d| d.and_hms_opt(14, 3, 9)).unwrap();
    let boot = BootReport {
        storage: true,
        ip: None,
        clock: Clock::synced(wall, 5_000),
        battery_v: 4.1,
        low_battery: false,
    };
    let backlight = Backlight::new(NoBacklight).unwrap();
    let mut app = PowerLogger::new(LoggerSettings::default(), &boot, root.clone(), backlight);
    let mut chip = BenchChip::default();
    let input = InputController::new();

    // Buttons arrive through the interrupt-side controller.
    let press = |button: Button, at: u32, app: &mut PowerLogger<NoBacklight>| {
        assert!(input.on_edge(button, at));
        app.setup_step(input.take())
    };
    press(Button::Next, 6_000, &mut app); // CH2
    press(Button::Activate, 6_300, &mut app); // CH2 off
    press(Button::Next, 6_600, &mut app); // CH3
    press(Button::Next, 6_900, &mut app); // AVG
    press(Button::Activate, 7_200, &mut app); // 4
    press(Button::Activate, 7_500, &mut app); // 16
    press(Button::Next, 7_800, &mut app); // START
    let texts = menu_screen(app.menu()).texts();
    assert_eq!(texts[3], " CH2: DISABLE");
    assert_eq!(texts[5], " AVG:      16");
    assert_eq!(press(Button::Activate, 8_100, &mut app), StepEvent::StartRequested);

    app.start_session(&mut chip, 8_100);
    assert_eq!(app.mode(), Mode::Logging);
    assert_eq!(chip.enabled, [true, false, true]);
    assert_eq!(chip.averaging, Some(AveragingMode::X16));

    for t in (8_300..=10_100).step_by(200) {
        assert_eq!(app.logging_step(&mut chip, NONE, t, 8_100), StepEvent::Sampled);
    }
    assert_eq!(app.logging_step(&mut chip, NEXT, 10_150, 10_150), StepEvent::ChannelChanged);
    assert_eq!(app.display_channel(), Channel::Three);

    let path = app.session().map(|s| s.path().to_path_buf()).unwrap();
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("2024-March-05_14-03-12.txt"));
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(
        lines[0],
        "date,time,load voltage 1,current mA 1,power mW 1,energy mWh 1,capacity mAh 1,\
         load voltage 3,current mA 3,power mW 3,energy mWh 3,capacity mAh 3"
    );
    assert_eq!(lines.len(), 11);
    for row in &lines[1..] {
        assert_eq!(row.split(',').count(), 12, "{}", row);
        assert!(row.starts_with("24/03/05,14:03:1"));
    }
    // 1.52 V on CH1 (1.5 V bus + 20 mV shunt), 200 mA
    assert!(lines[1].starts_with("24/03/05,14:03:12:300,1.52,200.00,304.00"));

    assert_eq!(app.logging_step(&mut chip, ACTIVATE, 10_200, 10_200), StepEvent::Stopped);
    assert_eq!(app.mode(), Mode::Setup);
    assert_eq!(app.menu().config.averaging, AveragingMode::X16);
    fs::remove_dir_all(&root).unwrap();
}
