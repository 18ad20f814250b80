// This is the power logger main program for ESP32-C3.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

#[cfg(target_os = "espidf")]
mod board;
#[cfg(target_os = "espidf")]
mod portal;
#[cfg(target_os = "espidf")]
mod timesync;
#[cfg(target_os = "espidf")]
mod wifi;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("power-logger is ESP32-C3 firmware; build it with --target riscv32imc-esp-espidf");
}

#[cfg(target_os = "espidf")]
mod firmware {
    use log::*;
    use std::path::PathBuf;

    use esp_idf_hal::delay::{Ets, FreeRtos};
    use esp_idf_hal::gpio::{IOPin, OutputPin, PinDriver};
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::ledc::config::{Resolution, TimerConfig};
    use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::EspWifi;
    use mipidsi::interface::SpiInterface;
    use mipidsi::models::ST7735s;
    use mipidsi::options::{ColorOrder, Orientation, Rotation};
    use mipidsi::Builder;

    use power_logger::app::START_SUPPRESS_MS;
    use power_logger::ina3221::{Ina3221, DEFAULT_ADDRESS};
    use power_logger::presenter::Screen;
    use power_logger::{
        run_boot, Backlight, BootOutcome, BootPlatform, DisplayPanel, LoggerSettings, Mode, PowerLogger, StepEvent,
        CONFIG,
    };

    use crate::board::{millis, restart, AdcBattery, ButtonPins, EspBoard, NvsCredentials, PwmBacklight, INPUT, SD_ROOT};

    const SPLASH_MS: u32 = 2000;
    const MENU_POLL_MS: u32 = 200;
    const LOGGING_POLL_MS: u32 = 10;
    const DISPLAY_BUFFER_LEN: usize = 512;

    fn show<D>(panel: &mut DisplayPanel<D>, screen: &Screen)
    where
        D: embedded_graphics::draw_target::DrawTarget<Color = embedded_graphics::pixelcolor::Rgb565>,
        D::Error: core::fmt::Debug,
    {
        if let Err(e) = panel.show(screen) {
            warn!("Display update failed: {:?}", e);
        }
    }

    pub fn run() -> anyhow::Result<()> {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        let settings = LoggerSettings::from_config(&CONFIG);
        info!(
            "Sample interval {} ms, shunt {} mOhm, alerts {}/{} mA",
            settings.sample_interval_ms, settings.shunt_resistance_mohm, settings.warn_current_ma, settings.crit_current_ma
        );

        // Peripherals Initialize
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs_partition = EspDefaultNvsPartition::take()?;

        // Backlight PWM GPIO1
        let timer_config = TimerConfig::default().frequency(5.kHz().into()).resolution(Resolution::Bits8);
        let timer_driver = LedcTimerDriver::new(peripherals.ledc.timer0, &timer_config)?;
        let pwm_driver = LedcDriver::new(peripherals.ledc.channel0, timer_driver, peripherals.pins.gpio1)?;
        let backlight = Backlight::new(PwmBacklight(pwm_driver))?;

        // SPI bus shared by the TFT and the SD card
        let spi: &'static SpiDriver<'static> = Box::leak(Box::new(SpiDriver::new(
            peripherals.spi2,
            peripherals.pins.gpio3,
            peripherals.pins.gpio5,
            Some(peripherals.pins.gpio4),
            &SpiDriverConfig::new(),
        )?));
        let tft_device = SpiDeviceDriver::new(spi, Some(peripherals.pins.gpio2), &SpiConfig::new().baudrate(26.MHz().into()))?;
        let dc = PinDriver::output(peripherals.pins.gpio21)?;
        let rst = PinDriver::output(peripherals.pins.gpio20)?;
        let buffer: &'static mut [u8] = Box::leak(Box::new([0u8; DISPLAY_BUFFER_LEN]));
        let di = SpiInterface::new(tft_device, dc, buffer);
        let display = Builder::new(ST7735s, di)
            .reset_pin(rst)
            .display_size(128, 160)
            .color_order(ColorOrder::Bgr)
            .orientation(Orientation::new().rotate(Rotation::Deg270))
            .init(&mut Ets)
            .map_err(|e| anyhow::anyhow!("Display init failed: {:?}", e))?;
        let mut panel = DisplayPanel::new(display);
        if let Err(e) = panel.splash() {
            warn!("Splash not drawn: {:?}", e);
        }
        FreeRtos::delay_ms(SPLASH_MS);

        // INA3221 on I2C SDA GPIO10 / SCL GPIO8
        let i2c_config = I2cConfig::new().baudrate(400.kHz().into());
        let i2c = I2cDriver::new(peripherals.i2c0, peripherals.pins.gpio10, peripherals.pins.gpio8, &i2c_config)?;
        let mohm = settings.shunt_resistance_mohm;
        let mut ina = Ina3221::new(i2c, DEFAULT_ADDRESS, [mohm; 3]);
        match ina.begin() {
            Ok(()) => info!("INA3221 ready, shunt {} mOhm", mohm),
            Err(e) => error!("INA3221 init failed: {:?}", e),
        }

        // Buttons GPIO7 (MENU) / GPIO9 (SELECT)
        let buttons = ButtonPins::new(peripherals.pins.gpio7.downgrade(), peripherals.pins.gpio9.downgrade())?;

        let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition.clone()))?;
        let credentials = NvsCredentials::new(nvs_partition)?;
        let battery = AdcBattery::new(peripherals.adc1, peripherals.pins.gpio0)?;
        let mut board = EspBoard::new(
            settings.clone(),
            spi,
            peripherals.pins.gpio6.downgrade_output(),
            wifi,
            credentials,
            battery,
            buttons,
        );

        let report = match run_boot(&mut board, &mut ina, &mut panel, &settings) {
            BootOutcome::Ready(report) => report,
            BootOutcome::Restart => {
                info!("Restarting after config portal timeout");
                restart();
            }
        };
        // Presses made during boot do not reach the menu.
        board.take_buttons();
        INPUT.touch(millis());

        let mut app = PowerLogger::new(settings, &report, PathBuf::from(SD_ROOT), backlight);
        panel.invalidate();

        loop {
            let buttons = board.take_buttons();
            match app.mode() {
                Mode::Setup => {
                    if app.setup_step(buttons) == StepEvent::StartRequested {
                        INPUT.set_suppressed(true);
                        show(&mut panel, &app.starting_screen());
                        app.start_session_after(&mut ina, || {
                            FreeRtos::delay_ms(START_SUPPRESS_MS);
                            board.take_buttons();
                            INPUT.set_suppressed(false);
                            millis()
                        });
                        INPUT.touch(millis());
                    } else {
                        FreeRtos::delay_ms(MENU_POLL_MS);
                    }
                }
                Mode::Logging => {
                    match app.logging_step(&mut ina, buttons, millis(), INPUT.last_activity_ms()) {
                        StepEvent::Sampled => app.update_battery(board.battery_voltage()),
                        StepEvent::Stopped => info!("Back to setup menu"),
                        _ => {}
                    }
                    FreeRtos::delay_ms(LOGGING_POLL_MS);
                }
            }
            show(&mut panel, &app.screen(millis()));
        }
    }
}
