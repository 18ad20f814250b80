// ESP32-C3 board adapters: buttons, backlight, battery ADC, NVS, SD card.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use std::net::Ipv4Addr;

use chrono::NaiveDateTime;
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Gpio0, Input, InterruptType, PinDriver, Pull};
use esp_idf_hal::ledc::LedcDriver;
use esp_idf_hal::sd::{spi::SdSpiHostDriver, SdCardConfiguration, SdCardDriver};
use esp_idf_hal::spi::SpiDriver;
use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::io::vfs::MountedFatfs;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_svc::wifi::EspWifi;

use power_logger::battery::{BatteryMonitor, BatterySense};
use power_logger::config::LoggerSettings;
use power_logger::credentials::{CredentialStore, WifiCredentials};
use power_logger::{BacklightDriver, BootPlatform, Button, Buttons, InputController};

use crate::{portal, timesync, wifi};

/// FAT mount point of the SD card.
pub const SD_ROOT: &str = "/sdcard";
const SD_MAX_OPEN_FILES: usize = 4;
const NVS_NAMESPACE: &str = "wifi";

/// Written by the GPIO interrupts, drained by the main loop.
pub static INPUT: InputController = InputController::new();

/// Milliseconds since boot, wrapping like a 32-bit counter.
pub fn millis() -> u32 {
    (unsafe { esp_idf_sys::esp_timer_get_time() } / 1000) as u32
}

pub fn restart() -> ! {
    unsafe { esp_idf_sys::esp_restart() }
}

/// Both push buttons, active low, reporting falling edges to [`INPUT`].
pub struct ButtonPins {
    next: PinDriver<'static, AnyIOPin, Input>,
    activate: PinDriver<'static, AnyIOPin, Input>,
}

fn button_pin(pin: AnyIOPin, button: Button) -> anyhow::Result<PinDriver<'static, AnyIOPin, Input>> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    driver.set_interrupt_type(InterruptType::NegEdge)?;
    unsafe {
        driver.subscribe(move || {
            INPUT.on_edge(button, millis());
        })?;
    }
    driver.enable_interrupt()?;
    Ok(driver)
}

impl ButtonPins {
    pub fn new(next: AnyIOPin, activate: AnyIOPin) -> anyhow::Result<Self> {
        Ok(ButtonPins {
            next: button_pin(next, Button::Next)?,
            activate: button_pin(activate, Button::Activate)?,
        })
    }

    /// Interrupts disable themselves after firing.
    pub fn rearm(&mut self) {
        for pin in [&mut self.next, &mut self.activate] {
            if let Err(e) = pin.enable_interrupt() {
                warn!("Button interrupt not re-armed: {:?}", e);
            }
        }
    }
}

/// LEDC channel driving the TFT backlight.
pub struct PwmBacklight(pub LedcDriver<'static>);

impl BacklightDriver for PwmBacklight {
    fn set_duty(&mut self, duty: u8) -> anyhow::Result<()> {
        let max_duty = self.0.get_max_duty();
        self.0.set_duty(duty as u32 * max_duty / u8::MAX as u32)?;
        Ok(())
    }
}

/// Battery divider on GPIO0.
pub struct AdcBattery(AdcChannelDriver<'static, Gpio0, AdcDriver<'static, ADC1>>);

impl AdcBattery {
    pub fn new(adc: ADC1, pin: Gpio0) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(AdcBattery(AdcChannelDriver::new(adc, pin, &config)?))
    }
}

impl BatterySense for AdcBattery {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        Ok(self.0.read_raw()?)
    }
}

/// Portal credentials kept in the NVS namespace `wifi`.
pub struct NvsCredentials(EspNvs<NvsDefault>);

impl NvsCredentials {
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        info!("NVS namespace {} opened", NVS_NAMESPACE);
        Ok(NvsCredentials(nvs))
    }
}

impl CredentialStore for NvsCredentials {
    fn load(&mut self) -> anyhow::Result<Option<WifiCredentials>> {
        let mut ssid_buf = [0u8; 33];
        let mut psk_buf = [0u8; 65];
        let Some(ssid) = self.0.get_str("ssid", &mut ssid_buf)? else {
            return Ok(None);
        };
        let psk = self.0.get_str("psk", &mut psk_buf)?.unwrap_or("");
        Ok(Some(WifiCredentials { ssid: ssid.to_string(), psk: psk.to_string() }))
    }

    fn store(&mut self, credentials: &WifiCredentials) -> anyhow::Result<()> {
        self.0.set_str("ssid", &credentials.ssid)?;
        self.0.set_str("psk", &credentials.psk)?;
        info!("WiFi credentials for {} saved", credentials.ssid);
        Ok(())
    }
}

/// Mounts the card on the shared SPI bus. The mount lives until reset.
pub fn mount_sdcard(spi: &'static SpiDriver<'static>, cs: AnyOutputPin) -> anyhow::Result<()> {
    let host = SdSpiHostDriver::new(spi, Some(cs), AnyIOPin::none(), AnyIOPin::none(), AnyIOPin::none(), None)?;
    let card = SdCardDriver::new_spi(host, &SdCardConfiguration::new())?;
    let mounted = MountedFatfs::mount(Fatfs::new_sdcard(0, card)?, SD_ROOT, SD_MAX_OPEN_FILES)?;
    Box::leak(Box::new(mounted));
    Ok(())
}

pub struct EspBoard {
    settings: LoggerSettings,
    spi: &'static SpiDriver<'static>,
    sd_cs: Option<AnyOutputPin>,
    wifi: EspWifi<'static>,
    credentials: NvsCredentials,
    battery: BatteryMonitor<AdcBattery>,
    buttons: ButtonPins,
}

impl EspBoard {
    pub fn new(
        settings: LoggerSettings,
        spi: &'static SpiDriver<'static>,
        sd_cs: AnyOutputPin,
        wifi: EspWifi<'static>,
        credentials: NvsCredentials,
        battery: AdcBattery,
        buttons: ButtonPins,
    ) -> Self {
        let scale = settings.battery_scale;
        EspBoard {
            settings,
            spi,
            sd_cs: Some(sd_cs),
            wifi,
            credentials,
            battery: BatteryMonitor::new(battery, scale),
            buttons,
        }
    }
}

impl BootPlatform for EspBoard {
    fn mount_storage(&mut self) -> bool {
        let Some(cs) = self.sd_cs.take() else {
            return false;
        };
        match mount_sdcard(self.spi, cs) {
            Ok(()) => true,
            Err(e) => {
                warn!("SD mount failed: {:?}", e);
                false
            }
        }
    }

    fn wifi_auto_connect(&mut self) -> Option<Ipv4Addr> {
        wifi::auto_connect(&mut self.wifi, &mut self.credentials, &self.settings)
    }

    fn run_portal(&mut self) -> anyhow::Result<Ipv4Addr> {
        portal::run_portal(&mut self.wifi, &mut self.credentials, &self.settings)
    }

    fn sync_time(&mut self) -> Option<NaiveDateTime> {
        timesync::sync_time(&self.settings.ntp_server, self.settings.ntp_timeout_ms, self.settings.utc_offset_secs)
    }

    fn battery_voltage(&mut self) -> anyhow::Result<f32> {
        self.battery.voltage()
    }

    fn millis(&self) -> u32 {
        millis()
    }

    fn take_buttons(&mut self) -> Buttons {
        self.buttons.rearm();
        INPUT.take()
    }

    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
