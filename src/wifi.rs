// WiFi station connect with stored or build-time credentials.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use std::net::Ipv4Addr;
use std::time::Duration;
use std::thread;

use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use anyhow::bail;
use anyhow::Result;
use log::*;

use power_logger::config::LoggerSettings;
use power_logger::credentials::{select_credentials, CredentialStore, WifiCredentials};

pub fn client_configuration(credentials: &WifiCredentials) -> Result<ClientConfiguration> {
    Ok(ClientConfiguration {
        ssid: credentials.ssid.as_str().try_into().map_err(|_| anyhow::anyhow!("Failed to convert SSID"))?,
        password: credentials.psk.as_str().try_into().map_err(|_| anyhow::anyhow!("Failed to convert password"))?,
        auth_method: if credentials.psk.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal },
        ..Default::default()
    })
}

/// Waits until the station is associated and has an address.
pub fn wait_for_ip(wifi: &EspWifi<'static>, timeout_secs: u32) -> Result<Ipv4Addr> {
    let mut waited = 0;
    while !wifi.is_connected().map_err(|e| anyhow::anyhow!("Failed to check WiFi status: {:?}", e))?
        || !wifi.sta_netif().is_up()?
    {
        thread::sleep(Duration::from_secs(1));
        waited += 1;
        info!("Waiting for WiFi connection... ({}/{})", waited, timeout_secs);
        if waited >= timeout_secs {
            bail!("WiFi connection timeout after {} seconds", timeout_secs);
        }
    }
    let ip = wifi.sta_netif().get_ip_info()?.ip;
    Ok(ip)
}

/// Station-only connect.
pub fn wifi_connect(wifi: &mut EspWifi<'static>, credentials: &WifiCredentials, timeout_secs: u32) -> Result<Ipv4Addr> {
    info!("Setting WiFi configuration...");
    wifi.set_configuration(&Configuration::Client(client_configuration(credentials)?))
        .map_err(|e| anyhow::anyhow!("Failed to set WiFi configuration: {:?}", e))?;

    if !wifi.is_started()? {
        info!("Starting WiFi...");
        wifi.start().map_err(|e| anyhow::anyhow!("Failed to start WiFi: {:?}", e))?;
    }

    info!("Connecting to WiFi network: {}", credentials.ssid);
    wifi.connect().map_err(|e| anyhow::anyhow!("Failed to connect to WiFi: {:?}", e))?;

    let ip = wait_for_ip(wifi, timeout_secs)?;
    info!("WiFi connected successfully, ip {}", ip);
    Ok(ip)
}

/// Boot-time connect. Any failure leaves the radio disconnected and returns `None`.
pub fn auto_connect<S: CredentialStore>(wifi: &mut EspWifi<'static>, store: &mut S, settings: &LoggerSettings) -> Option<Ipv4Addr> {
    let stored = match store.load() {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Stored WiFi credentials unreadable: {:?}", e);
            None
        }
    };
    let Some(credentials) = select_credentials(stored, &settings.wifi_ssid, &settings.wifi_psk) else {
        info!("No WiFi credentials configured");
        return None;
    };
    match wifi_connect(wifi, &credentials, settings.wifi_connect_timeout_secs) {
        Ok(ip) => Some(ip),
        Err(e) => {
            warn!("{:?}", e);
            if let Err(e) = wifi.disconnect() {
                debug!("WiFi disconnect: {:?}", e);
            }
            None
        }
    }
}
