// NTP time sync.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::{thread, time::Duration};
use std::time::SystemTime;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use esp_idf_svc::sntp::{EspSntp, SntpConf, OperatingMode, SyncMode, SyncStatus};

const POLL_MS: u32 = 10;

/// Local time (UTC shifted by `utc_offset_secs`), or `None` when the sync
/// does not complete within `timeout_ms`.
pub fn sync_time(server: &str, timeout_ms: u32, utc_offset_secs: i32) -> Option<NaiveDateTime> {
    let mut sntp_conf = SntpConf {
        operating_mode: OperatingMode::Poll,
        sync_mode: SyncMode::Immediate,
        ..Default::default()
    };
    sntp_conf.servers[0] = server;
    let ntp = match EspSntp::new(&sntp_conf) {
        Ok(ntp) => ntp,
        Err(e) => {
            warn!("SNTP start failed: {:?}", e);
            return None;
        }
    };

    info!("NTP Sync Start..");
    let mut sync_count = 0;
    while ntp.get_sync_status() != SyncStatus::Completed {
        sync_count += 1;
        if sync_count * POLL_MS > timeout_ms {
            info!("NTP Sync Timeout");
            return None;
        }
        thread::sleep(Duration::from_millis(POLL_MS as u64));
    }
    let dt_now: DateTime<Utc> = SystemTime::now().into();
    let local = dt_now.naive_utc() + TimeDelta::seconds(utc_offset_secs as i64);
    info!("NTP Sync Completed: {}", local.format("%Y-%m-%d %H:%M:%S"));
    Some(local)
}
