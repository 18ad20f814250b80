// WiFi credentials: selection at boot and the captive-portal form.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use thiserror::Error;

const SSID_MAX_LEN: usize = 32;
const PSK_MAX_LEN: usize = 64;
const PSK_MIN_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub psk: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("ssid missing")]
    MissingSsid,
    #[error("ssid longer than 32 bytes")]
    SsidTooLong,
    #[error("password must be empty or 8 to 64 bytes")]
    BadPassword,
    #[error("malformed percent escape")]
    BadEscape,
}

/// Persistent storage of the credentials entered in the portal.
pub trait CredentialStore {
    fn load(&mut self) -> anyhow::Result<Option<WifiCredentials>>;
    fn store(&mut self, credentials: &WifiCredentials) -> anyhow::Result<()>;
}

/// Stored credentials win over the build-time ones; an empty build-time
/// SSID means there is nothing to try.
pub fn select_credentials(stored: Option<WifiCredentials>, ssid: &str, psk: &str) -> Option<WifiCredentials> {
    stored
        .filter(|c| !c.ssid.is_empty())
        .or_else(|| (!ssid.is_empty()).then(|| WifiCredentials { ssid: ssid.to_string(), psk: psk.to_string() }))
}

/// Parses the `application/x-www-form-urlencoded` body posted by [`PORTAL_PAGE`].
pub fn parse_credentials_form(body: &str) -> Result<WifiCredentials, FormError> {
    let mut ssid = None;
    let mut psk = String::new();
    for pair in body.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "ssid" => ssid = Some(url_decode(value)?),
            "psk" => psk = url_decode(value)?,
            _ => {}
        }
    }
    let ssid = ssid.filter(|s| !s.is_empty()).ok_or(FormError::MissingSsid)?;
    if ssid.len() > SSID_MAX_LEN {
        return Err(FormError::SsidTooLong);
    }
    if !psk.is_empty() && !(PSK_MIN_LEN..=PSK_MAX_LEN).contains(&psk.len()) {
        return Err(FormError::BadPassword);
    }
    Ok(WifiCredentials { ssid, psk })
}

fn url_decode(s: &str) -> Result<String, FormError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or(FormError::BadEscape)?;
                let hex = std::str::from_utf8(hex).map_err(|_| FormError::BadEscape)?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| FormError::BadEscape)?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| FormError::BadEscape)
}

pub const PORTAL_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta name="viewport" content="width=device-width, initial-scale=1">
<title>Power Logger WiFi</title></head>
<body><h2>Power Logger WiFi setup</h2>
<form method="post" action="/save">
<p>SSID<br><input name="ssid" maxlength="32"></p>
<p>Password<br><input name="psk" type="password" maxlength="64"></p>
<p><input type="submit" value="Save"></p>
</form></body></html>
"#;

pub const SAVED_PAGE: &str = r#"<!DOCTYPE html>
<html><body><h2>Saved. Connecting...</h2></body></html>
"#;
