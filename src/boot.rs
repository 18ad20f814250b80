// Boot sequence: storage, WiFi (with the offline/portal choice), time and battery.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use chrono::NaiveDateTime;
use core::fmt::Debug;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::DrawTarget;
use log::*;
use std::net::Ipv4Addr;

use crate::battery;
use crate::channels::{Channel, SenseChip};
use crate::clock::Clock;
use crate::config::LoggerSettings;
use crate::displayctl::DisplayPanel;
use crate::input::Buttons;
use crate::presenter::{FontSize, Line, ALERT, GOOD, TEXT};

const CHOICE_POLL_MS: u32 = 50;
const PORTAL_IP_HOLD_MS: u32 = 1000;
const RESTART_HOLD_MS: u32 = 3000;
const ALERT_WRITE_DELAY_MS: u32 = 250;
const BOOT_COMPLETE_HOLD_MS: u32 = 2500;
/// Stage results end in this column.
const STATUS_WIDTH: usize = 13;

/// Board services the boot sequence needs.
pub trait BootPlatform {
    /// Mounts the SD card. Returns whether it is usable.
    fn mount_storage(&mut self) -> bool;
    /// Station connect with the stored or configured credentials.
    fn wifi_auto_connect(&mut self) -> Option<Ipv4Addr>;
    /// Blocking captive portal; an error means it timed out.
    fn run_portal(&mut self) -> anyhow::Result<Ipv4Addr>;
    /// Local wall-clock time from NTP, or `None` on timeout.
    fn sync_time(&mut self) -> Option<NaiveDateTime>;
    fn battery_voltage(&mut self) -> anyhow::Result<f32>;
    fn millis(&self) -> u32;
    fn take_buttons(&mut self) -> Buttons;
    fn delay_ms(&mut self, ms: u32);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootReport {
    pub storage: bool,
    pub ip: Option<Ipv4Addr>,
    pub clock: Clock,
    pub battery_v: f32,
    pub low_battery: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootOutcome {
    Ready(BootReport),
    /// The captive portal timed out; the device has to restart.
    Restart,
}

/// What to do after auto-connect failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChoice {
    Offline,
    Portal,
}

/// Waits for a button: next opens the portal, activate continues offline.
/// Next wins when both arrive in one poll. Without a press the boot goes
/// offline after `timeout_ms`.
pub fn wait_for_network_choice<P: BootPlatform>(platform: &mut P, timeout_ms: u32) -> NetworkChoice {
    let start = platform.millis();
    loop {
        let buttons = platform.take_buttons();
        if buttons.next {
            return NetworkChoice::Portal;
        }
        if buttons.activate {
            return NetworkChoice::Offline;
        }
        if platform.millis().wrapping_sub(start) >= timeout_ms {
            info!("No choice within {} ms, continuing without WiFi", timeout_ms);
            return NetworkChoice::Offline;
        }
        platform.delay_ms(CHOICE_POLL_MS);
    }
}

/// Clears the channel 1 over-current limits, then sets warn and critical.
pub fn configure_alert_limits<C: SenseChip, P: BootPlatform>(chip: &mut C, platform: &mut P, warn_ma: i32, crit_ma: i32) {
    let steps = [(-1, -1), (warn_ma, crit_ma)];
    for (warn, crit) in steps {
        if let Err(e) = chip.set_alert_limits(Channel::One, warn, crit) {
            warn!("Alert limits {}/{} mA not set: {:?}", warn, crit, e);
        }
        platform.delay_ms(ALERT_WRITE_DELAY_MS);
    }
}

fn report<D>(panel: &mut DisplayPanel<D>, line: Line)
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: Debug,
{
    if let Err(e) = panel.append(&line) {
        warn!("Boot report not drawn: {:?}", e);
    }
}

fn status_line(label: &str, ok: bool) -> Line {
    let line = Line::large(label, TEXT);
    let width = STATUS_WIDTH.saturating_sub(label.len());
    if ok {
        line.push(format!("{:>w$}", "OK", w = width), GOOD)
    } else {
        line.push(format!("{:>w$}", "X", w = width), ALERT)
    }
}

/// Runs the whole boot sequence once, reporting each stage on `panel`.
pub fn run_boot<P, C, D>(platform: &mut P, chip: &mut C, panel: &mut DisplayPanel<D>, settings: &LoggerSettings) -> BootOutcome
where
    P: BootPlatform,
    C: SenseChip,
    D: DrawTarget<Color = Rgb565>,
    D::Error: Debug,
{
    info!("Starting boot sequence");
    if let Err(e) = panel.clear() {
        warn!("Display clear failed: {:?}", e);
    }
    report(panel, Line::large("Booting ...", ALERT));
    report(panel, Line::blank(FontSize::Large));

    let storage = platform.mount_storage();
    if storage {
        info!("SD card mounted");
    } else {
        warn!("SD card failed or not present, logging to file disabled");
    }
    report(panel, status_line("SD Card", storage));

    let mut ip = platform.wifi_auto_connect();
    match ip {
        Some(addr) => {
            info!("WiFi connected, local ip {}", addr);
            report(panel, status_line("WIFI", true));
            report(panel, Line::small(format!("local ip   {}", addr), TEXT));
        }
        None => {
            warn!("WiFi auto-connect failed");
            report(panel, status_line("WIFI", false));
            report(panel, Line::blank(FontSize::Small));
            report(panel, Line::small("start without WIFI SELECT", TEXT));
            report(panel, Line::small("start ConfigPortal MENU", TEXT));
            let timeout_ms = settings.boot_choice_timeout_secs.saturating_mul(1000);
            match wait_for_network_choice(platform, timeout_ms) {
                NetworkChoice::Portal => {
                    info!("Config portal started");
                    report(panel, Line::small("ConfigPortal started", TEXT));
                    match platform.run_portal() {
                        Ok(addr) => {
                            info!("Portal connected, local ip {}", addr);
                            report(panel, Line::blank(FontSize::Small));
                            report(panel, Line::small(format!("local ip   {}", addr), TEXT));
                            platform.delay_ms(PORTAL_IP_HOLD_MS);
                            ip = Some(addr);
                        }
                        Err(e) => {
                            error!("Config portal failed: {:?}", e);
                            platform.delay_ms(RESTART_HOLD_MS);
                            return BootOutcome::Restart;
                        }
                    }
                }
                NetworkChoice::Offline => {
                    info!("Continuing without WiFi");
                }
            }
        }
    }

    let clock = match ip.and_then(|_| platform.sync_time()) {
        Some(wall) => {
            info!("NTP sync completed: {}", wall.format("%Y-%m-%d %H:%M:%S"));
            Clock::synced(wall, platform.millis())
        }
        None => {
            warn!("NTP sync failed, using unsynced clock");
            Clock::unsynced()
        }
    };
    report(panel, status_line("TIME", clock.is_synced()));

    let battery_v = match platform.battery_voltage() {
        Ok(v) => v,
        Err(e) => {
            warn!("Battery voltage unavailable: {:?}", e);
            0.0
        }
    };
    let low_battery = battery::is_low(battery_v, settings.battery_low_volts);
    if low_battery {
        warn!("Battery low: {:.2} V", battery_v);
    } else {
        info!("Battery {:.2} V", battery_v);
    }
    report(
        panel,
        Line::large("BATTERY", TEXT).push(format!("  {:.2}", battery_v), if low_battery { ALERT } else { TEXT }),
    );

    configure_alert_limits(chip, platform, settings.warn_current_ma, settings.crit_current_ma);

    report(panel, Line::blank(FontSize::Small));
    report(panel, Line::large("BOOT COMPLETE", GOOD));
    platform.delay_ms(BOOT_COMPLETE_HOLD_MS);

    BootOutcome::Ready(BootReport { storage, ip, clock, battery_v, low_battery })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::tests::FixedChip;
    use crate::displayctl::tests::FrameBuffer;
    use chrono::NaiveDate;

    /// Scripted board. Time only moves through `delay_ms`.
    struct FakeBoard {
        now: u32,
        storage: bool,
        wifi: Option<Ipv4Addr>,
        portal: Option<Ipv4Addr>,
        portal_runs: u32,
        time: Option<NaiveDateTime>,
        time_requests: u32,
        battery: f32,
        /// (at_ms, buttons) delivered at the first poll at or after `at_ms`.
        presses: Vec<(u32, Buttons)>,
    }

    impl FakeBoard {
        fn new() -> Self {
            FakeBoard {
                now: 0,
                storage: true,
                wifi: Some(Ipv4Addr::new(192, 168, 1, 20)),
                portal: None,
                portal_runs: 0,
                time: NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|d| d.and_hms_opt(14, 3, 9)),
                time_requests: 0,
                battery: 3.9,
                presses: Vec::new(),
            }
        }
    }

    impl BootPlatform for FakeBoard {
        fn mount_storage(&mut self) -> bool {
            self.storage
        }
        fn wifi_auto_connect(&mut self) -> Option<Ipv4Addr> {
            self.wifi
        }
        fn run_portal(&mut self) -> anyhow::Result<Ipv4Addr> {
            self.portal_runs += 1;
            self.portal.ok_or_else(|| anyhow::anyhow!("portal timeout"))
        }
        fn sync_time(&mut self) -> Option<NaiveDateTime> {
            self.time_requests += 1;
            self.time
        }
        fn battery_voltage(&mut self) -> anyhow::Result<f32> {
            Ok(self.battery)
        }
        fn millis(&self) -> u32 {
            self.now
        }
        fn take_buttons(&mut self) -> Buttons {
            if self.presses.first().is_some_and(|(at, _)| *at <= self.now) {
                return self.presses.remove(0).1;
            }
            Buttons::default()
        }
        fn delay_ms(&mut self, ms: u32) {
            self.now = self.now.wrapping_add(ms);
        }
    }

    fn boot(board: &mut FakeBoard, chip: &mut FixedChip) -> BootOutcome {
        let mut panel = DisplayPanel::new(FrameBuffer::new());
        run_boot(board, chip, &mut panel, &LoggerSettings::default())
    }

    #[test]
    fn all_stages_pass() {
        let mut board = FakeBoard::new();
        let mut chip = FixedChip::default();
        let BootOutcome::Ready(report) = boot(&mut board, &mut chip) else { panic!("restart") };
        assert!(report.storage);
        assert_eq!(report.ip, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert!(report.clock.is_synced());
        assert!(!report.low_battery);
        assert_eq!(chip.alerts, vec![(Channel::One, -1, -1), (Channel::One, 1000, 1500)]);
    }

    #[test]
    fn offline_choice_skips_time_sync() {
        let mut board = FakeBoard::new();
        board.wifi = None;
        board.presses.push((300, Buttons { next: false, activate: true }));
        let BootOutcome::Ready(report) = boot(&mut board, &mut FixedChip::default()) else { panic!("restart") };
        assert_eq!(report.ip, None);
        assert!(!report.clock.is_synced());
        assert_eq!(board.portal_runs, 0);
        assert_eq!(board.time_requests, 0);
    }

    #[test]
    fn portal_choice_connects() {
        let mut board = FakeBoard::new();
        board.wifi = None;
        board.portal = Some(Ipv4Addr::new(10, 0, 0, 7));
        board.presses.push((0, Buttons { next: true, activate: true }));
        let BootOutcome::Ready(report) = boot(&mut board, &mut FixedChip::default()) else { panic!("restart") };
        assert_eq!(report.ip, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(board.portal_runs, 1);
        assert!(report.clock.is_synced());
    }

    #[test]
    fn portal_timeout_restarts() {
        let mut board = FakeBoard::new();
        board.wifi = None;
        board.presses.push((0, Buttons { next: true, activate: false }));
        assert_eq!(boot(&mut board, &mut FixedChip::default()), BootOutcome::Restart);
    }

    #[test]
    fn choice_times_out_to_offline() {
        let mut board = FakeBoard::new();
        board.wifi = None;
        let choice = wait_for_network_choice(&mut board, 120_000);
        assert_eq!(choice, NetworkChoice::Offline);
        assert!(board.now >= 120_000 && board.now < 120_000 + CHOICE_POLL_MS);
    }

    #[test]
    fn storage_failure_and_low_battery_degrade_only() {
        let mut board = FakeBoard::new();
        board.storage = false;
        board.time = None;
        board.battery = 3.1;
        let BootOutcome::Ready(report) = boot(&mut board, &mut FixedChip::default()) else { panic!("restart") };
        assert!(!report.storage);
        assert!(!report.clock.is_synced());
        assert!(report.low_battery);
        assert!(report.ip.is_some());
    }

    #[test]
    fn status_results_share_a_column() {
        let texts: Vec<String> = ["SD Card", "WIFI", "TIME"].iter().map(|l| status_line(l, true).text()).collect();
        assert!(texts.iter().all(|t| t.len() == 13));
        assert_eq!(texts[0], "SD Card    OK");
        assert_eq!(status_line("WIFI", false).text(), "WIFI        X");
    }
}
