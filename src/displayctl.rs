// Display control: draws presenter screens onto the TFT and runs the backlight.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use log::*;
use embedded_graphics::{
    mono_font::{ascii::{FONT_6X10, FONT_9X15}, MonoFont, MonoTextStyleBuilder},
    pixelcolor::Rgb565,
    text::{Baseline, Text},
    geometry::{Point, Size},
    prelude::*,
    image::Image,
    primitives::{Rectangle, PrimitiveStyle},
};
use tinybmp::Bmp;

use crate::presenter::{FontSize, Line, Screen, BACKGROUND};

/// Full backlight duty while the display is awake.
pub const BACKLIGHT_FULL: u8 = 255;
/// Backlight duty while the display sleeps.
pub const BACKLIGHT_DIM: u8 = 5;
/// The display sleeps once no button was pressed for longer than this.
pub const DISPLAY_SLEEP_MS: u32 = 30_000;

const LOGO: &[u8] = include_bytes!("../assets/logo.bmp");

fn font(size: FontSize) -> &'static MonoFont<'static> {
    match size {
        FontSize::Large => &FONT_9X15,
        FontSize::Small => &FONT_6X10,
    }
}

fn line_height(size: FontSize) -> i32 {
    font(size).character_size.height as i32
}

/// Text renderer over any RGB565 draw target. `show` skips the redraw when the
/// screen did not change since the last call.
pub struct DisplayPanel<D> {
    display: D,
    cursor_y: i32,
    last: Option<Screen>,
}

impl<D: DrawTarget<Color = Rgb565>> DisplayPanel<D> {

    pub fn new(display: D) -> Self {
        DisplayPanel { display, cursor_y: 0, last: None }
    }

    pub fn clear(&mut self) -> Result<(), D::Error> {
        self.display.clear(BACKGROUND)?;
        self.cursor_y = 0;
        self.last = None;
        Ok(())
    }

    /// Logo centred on a cleared screen.
    pub fn splash(&mut self) -> Result<(), D::Error> {
        self.clear()?;
        match Bmp::<Rgb565>::from_slice(LOGO) {
            Ok(bmp) => {
                let area = self.display.bounding_box();
                let logo = bmp.bounding_box().size;
                let x = (area.size.width.saturating_sub(logo.width) / 2) as i32;
                let y = (area.size.height.saturating_sub(logo.height) / 2) as i32;
                Image::new(&bmp, area.top_left + Point::new(x, y)).draw(&mut self.display)?;
            }
            Err(e) => {
                warn!("Logo bitmap unreadable: {:?}", e);
            }
        }
        Ok(())
    }

    /// Draws `line` below the previous one, as the boot report does. A line
    /// that does not fit starts a fresh page.
    pub fn append(&mut self, line: &Line) -> Result<(), D::Error> {
        let height = self.display.bounding_box().size.height as i32;
        if self.last.is_some() || self.cursor_y + line_height(line.size) > height {
            self.clear()?;
        }
        let y = self.cursor_y;
        self.draw_line(line, y)?;
        self.cursor_y += line_height(line.size);
        Ok(())
    }

    /// Replaces the whole screen. Returns whether anything was drawn.
    pub fn show(&mut self, screen: &Screen) -> Result<bool, D::Error> {
        if self.last.as_ref() == Some(screen) {
            return Ok(false);
        }
        if self.last.is_none() {
            self.display.clear(BACKGROUND)?;
        }
        let mut y = 0;
        for line in &screen.lines {
            self.draw_line(line, y)?;
            y += line_height(line.size);
        }
        let width = self.display.bounding_box().size.width;
        let height = self.display.bounding_box().size.height as i32;
        if y < height {
            Rectangle::new(Point::new(0, y), Size::new(width, (height - y) as u32))
                .into_styled(PrimitiveStyle::with_fill(BACKGROUND))
                .draw(&mut self.display)?;
        }
        self.cursor_y = 0;
        self.last = Some(screen.clone());
        Ok(true)
    }

    /// Forces the next `show` to draw even if the screen is unchanged.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    fn draw_line(&mut self, line: &Line, y: i32) -> Result<(), D::Error> {
        let mut pos = Point::new(0, y);
        for span in &line.spans {
            let style = MonoTextStyleBuilder::new()
                .font(font(line.size))
                .text_color(span.color)
                .background_color(BACKGROUND)
                .build();
            pos = Text::with_baseline(&span.text, pos, style, Baseline::Top).draw(&mut self.display)?;
        }
        // Erase what a longer previous line left behind.
        let width = self.display.bounding_box().size.width as i32;
        if pos.x < width {
            Rectangle::new(Point::new(pos.x, y), Size::new((width - pos.x) as u32, line_height(line.size) as u32))
                .into_styled(PrimitiveStyle::with_fill(BACKGROUND))
                .draw(&mut self.display)?;
        }
        Ok(())
    }
}

/// PWM output behind the TFT backlight.
pub trait BacklightDriver {
    fn set_duty(&mut self, duty: u8) -> anyhow::Result<()>;
}

/// Two-level backlight: full while awake, dimmed after [`DISPLAY_SLEEP_MS`]
/// without a button press.
pub struct Backlight<B> {
    driver: B,
    awake: bool,
}

impl<B: BacklightDriver> Backlight<B> {

    pub fn new(mut driver: B) -> anyhow::Result<Self> {
        driver.set_duty(BACKLIGHT_FULL)?;
        Ok(Backlight { driver, awake: true })
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn duty(&self) -> u8 {
        if self.awake { BACKLIGHT_FULL } else { BACKLIGHT_DIM }
    }

    pub fn wake(&mut self) {
        if !self.awake {
            info!("Display wake");
            self.awake = true;
            self.apply();
        }
    }

    pub fn sleep(&mut self) {
        if self.awake {
            info!("Display sleep");
            self.awake = false;
            self.apply();
        }
    }

    /// Dims once `now_ms` is more than [`DISPLAY_SLEEP_MS`] past the last press.
    pub fn update(&mut self, now_ms: u32, last_activity_ms: u32) {
        if self.awake && now_ms.wrapping_sub(last_activity_ms) > DISPLAY_SLEEP_MS {
            self.sleep();
        }
    }

    pub fn driver(&self) -> &B {
        &self.driver
    }

    fn apply(&mut self) {
        let duty = self.duty();
        if let Err(e) = self.driver.set_duty(duty) {
            warn!("Backlight duty {} failed: {:?}", duty, e);
        }
    }
}
