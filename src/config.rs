// Build-time configuration for the power logger.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::str::FromStr;

#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    wifi_ssid: &'static str,
    #[default("")]
    wifi_psk: &'static str,
    #[default("PowerLogger_Portal")]
    portal_ssid: &'static str,
    #[default("120")]
    portal_timeout_secs: &'static str,
    #[default("10")]
    wifi_connect_timeout_secs: &'static str,
    #[default("120")]
    boot_choice_timeout_secs: &'static str,
    #[default("pool.ntp.org")]
    ntp_server: &'static str,
    #[default("10000")]
    ntp_timeout_ms: &'static str,
    #[default("7200")]
    utc_offset_secs: &'static str,
    #[default("200")]
    sample_interval_ms: &'static str,
    #[default("10")]
    shunt_resistance_mohm: &'static str,
    #[default("1000")]
    warn_current_ma: &'static str,
    #[default("1500")]
    crit_current_ma: &'static str,
    #[default("5.8")]
    battery_scale: &'static str,
    #[default("3.3")]
    battery_low_volts: &'static str,
}

/// Typed view of [`Config`]. Every field falls back to its default when the
/// configured string does not parse.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerSettings {
    pub wifi_ssid: String,
    pub wifi_psk: String,
    pub portal_ssid: String,
    pub portal_timeout_secs: u32,
    pub wifi_connect_timeout_secs: u32,
    pub boot_choice_timeout_secs: u32,
    pub ntp_server: String,
    pub ntp_timeout_ms: u32,
    pub utc_offset_secs: i32,
    pub sample_interval_ms: u32,
    pub shunt_resistance_mohm: u32,
    pub warn_current_ma: i32,
    pub crit_current_ma: i32,
    pub battery_scale: f32,
    pub battery_low_volts: f32,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        LoggerSettings {
            wifi_ssid: String::new(),
            wifi_psk: String::new(),
            portal_ssid: "PowerLogger_Portal".to_string(),
            portal_timeout_secs: 120,
            wifi_connect_timeout_secs: 10,
            boot_choice_timeout_secs: 120,
            ntp_server: "pool.ntp.org".to_string(),
            ntp_timeout_ms: 10_000,
            utc_offset_secs: 7200,
            sample_interval_ms: 200,
            shunt_resistance_mohm: 10,
            warn_current_ma: 1000,
            crit_current_ma: 1500,
            battery_scale: 5.8,
            battery_low_volts: 3.3,
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(key: &str, value: &str, default: T) -> T {
    match value.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Config {}={:?} is invalid, using {:?}", key, value, default);
            default
        }
    }
}

impl LoggerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let d = LoggerSettings::default();
        let mut settings = LoggerSettings {
            wifi_ssid: cfg.wifi_ssid.to_string(),
            wifi_psk: cfg.wifi_psk.to_string(),
            portal_ssid: if cfg.portal_ssid.is_empty() { d.portal_ssid.clone() } else { cfg.portal_ssid.to_string() },
            portal_timeout_secs: parse_or("portal_timeout_secs", cfg.portal_timeout_secs, d.portal_timeout_secs),
            wifi_connect_timeout_secs: parse_or("wifi_connect_timeout_secs", cfg.wifi_connect_timeout_secs, d.wifi_connect_timeout_secs),
            boot_choice_timeout_secs: parse_or("boot_choice_timeout_secs", cfg.boot_choice_timeout_secs, d.boot_choice_timeout_secs),
            ntp_server: if cfg.ntp_server.is_empty() { d.ntp_server.clone() } else { cfg.ntp_server.to_string() },
            ntp_timeout_ms: parse_or("ntp_timeout_ms", cfg.ntp_timeout_ms, d.ntp_timeout_ms),
            utc_offset_secs: parse_or("utc_offset_secs", cfg.utc_offset_secs, d.utc_offset_secs),
            sample_interval_ms: parse_or("sample_interval_ms", cfg.sample_interval_ms, d.sample_interval_ms),
            shunt_resistance_mohm: parse_or("shunt_resistance_mohm", cfg.shunt_resistance_mohm, d.shunt_resistance_mohm),
            warn_current_ma: parse_or("warn_current_ma", cfg.warn_current_ma, d.warn_current_ma),
            crit_current_ma: parse_or("crit_current_ma", cfg.crit_current_ma, d.crit_current_ma),
            battery_scale: parse_or("battery_scale", cfg.battery_scale, d.battery_scale),
            battery_low_volts: parse_or("battery_low_volts", cfg.battery_low_volts, d.battery_low_volts),
        };
        // Zero is never valid for either of these.
        if settings.sample_interval_ms == 0 {
            warn!("Config sample_interval_ms=0 is invalid, using {}", d.sample_interval_ms);
            settings.sample_interval_ms = d.sample_interval_ms;
        }
        if settings.shunt_resistance_mohm == 0 {
            warn!("Config shunt_resistance_mohm=0 is invalid, using {}", d.shunt_resistance_mohm);
            settings.shunt_resistance_mohm = d.shunt_resistance_mohm;
        }
        settings
    }
}
