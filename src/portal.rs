// Captive portal: soft-AP with a credentials form, blocking until connected or timed out.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::bail;
use anyhow::Result;
use embedded_svc::http::Method;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi};

use power_logger::config::LoggerSettings;
use power_logger::credentials::{parse_credentials_form, CredentialStore, WifiCredentials, PORTAL_PAGE, SAVED_PAGE};

use crate::wifi;

const MAX_FORM_LEN: usize = 512;

fn start_server(tx: mpsc::Sender<WifiCredentials>) -> Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&HttpConfiguration::default())?;

    server.fn_handler("/", Method::Get, |req| -> Result<()> {
        req.into_ok_response()?.write_all(PORTAL_PAGE.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler("/save", Method::Post, move |mut req| -> Result<()> {
        let mut body = [0u8; MAX_FORM_LEN];
        let mut len = 0;
        while len < body.len() {
            let n = req.read(&mut body[len..])?;
            if n == 0 {
                break;
            }
            len += n;
        }
        let form = std::str::from_utf8(&body[..len]).unwrap_or("");
        match parse_credentials_form(form) {
            Ok(credentials) => {
                info!("Portal received credentials for {}", credentials.ssid);
                req.into_ok_response()?.write_all(SAVED_PAGE.as_bytes())?;
                if tx.send(credentials).is_err() {
                    warn!("Portal already closed");
                }
            }
            Err(e) => {
                info!("Portal form rejected: {}", e);
                req.into_status_response(400)?.write_all(e.to_string().as_bytes())?;
            }
        }
        Ok(())
    })?;

    Ok(server)
}

/// Opens the access point and serves the form until a submitted network
/// connects or `portal_timeout_secs` pass. Successful credentials are stored.
pub fn run_portal<S: CredentialStore>(wifi: &mut EspWifi<'static>, store: &mut S, settings: &LoggerSettings) -> Result<Ipv4Addr> {
    let ap = AccessPointConfiguration {
        ssid: settings.portal_ssid.as_str().try_into().map_err(|_| anyhow::anyhow!("Failed to convert portal SSID"))?,
        auth_method: AuthMethod::None,
        channel: 1,
        ..Default::default()
    };
    wifi.set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap.clone()))?;
    if !wifi.is_started()? {
        wifi.start()?;
    }
    info!("Config portal {} open on {}", settings.portal_ssid, wifi.ap_netif().get_ip_info()?.ip);

    let (tx, rx) = mpsc::channel();
    let server = start_server(tx)?;
    let deadline = Instant::now() + Duration::from_secs(settings.portal_timeout_secs as u64);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("config portal timeout after {} seconds", settings.portal_timeout_secs);
        }
        let credentials = match rx.recv_timeout(remaining) {
            Ok(credentials) => credentials,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => bail!("config portal server stopped"),
        };

        wifi.set_configuration(&Configuration::Mixed(wifi::client_configuration(&credentials)?, ap.clone()))?;
        if let Err(e) = wifi.connect() {
            warn!("Portal connect to {} failed: {:?}", credentials.ssid, e);
            continue;
        }
        match wifi::wait_for_ip(wifi, settings.wifi_connect_timeout_secs) {
            Ok(_) => {
                if let Err(e) = store.store(&credentials) {
                    warn!("WiFi credentials not saved: {:?}", e);
                }
                drop(server);
                // Leave AP mode and reconnect as a plain station.
                return wifi::wifi_connect(wifi, &credentials, settings.wifi_connect_timeout_secs);
            }
            Err(e) => {
                warn!("{:?}", e);
                if let Err(e) = wifi.disconnect() {
                    debug!("WiFi disconnect: {:?}", e);
                }
            }
        }
    }
}
