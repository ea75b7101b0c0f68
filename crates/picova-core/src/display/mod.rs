//! Display sink for the windowed average
//!
//! The display shows the last average the reporter handed over as three
//! lines: volts, milliamps, milliwatts. It runs at the lowest priority and
//! only ever sees averages, never individual samples.

mod framing;
mod ssd1306;

pub use framing::{CONTROL_COMMAND, CONTROL_DATA, FrameState, Framer};
pub use ssd1306::{HEIGHT, SSD1306_ADDRESS, Ssd1306, WIDTH};

use core::convert::Infallible;
use core::fmt::Write as _;

use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use embedded_hal_async::i2c::ErrorKind;
use heapless::String;
use log::warn;
use thiserror_no_std::Error;

use crate::ina219::Reading;
use crate::reporter::DisplayReceiver;

pub const LINE_MAX: usize = 24;

const LINE_HEIGHT: i32 = 21;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    #[error("display bus transaction failed: {0:?}")]
    Bus(ErrorKind),
}

/// Monochrome drawing surface that is pushed to the glass on `flush`
pub trait Panel: DrawTarget<Color = BinaryColor, Error = Infallible> {
    fn flush(&mut self) -> impl Future<Output = Result<(), DisplayError>>;
}

/// The three display lines for `reading`
pub fn format_lines(reading: &Reading) -> [String<LINE_MAX>; 3] {
    let mut lines = [String::new(), String::new(), String::new()];
    // Values too wide for LINE_MAX are cut short rather than rejected
    let _ = write!(lines[0], "{:.3} V", reading.bus_v);
    let _ = write!(lines[1], "{:.2} mA", reading.current_ma);
    let _ = write!(lines[2], "{:.2} mW", reading.power_mw);
    lines
}

pub struct DisplayPanel<P> {
    panel: P,
    style: MonoTextStyle<'static, BinaryColor>,
}

impl<P: Panel> DisplayPanel<P> {
    pub fn new(panel: P) -> Self {
        Self {
            panel,
            style: MonoTextStyleBuilder::new()
                .font(&FONT_10X20)
                .text_color(BinaryColor::On)
                .build(),
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn into_inner(self) -> P {
        self.panel
    }

    /// Render `reading` into the panel without flushing.
    pub fn draw(&mut self, reading: &Reading) {
        let Ok(()) = self.panel.clear(BinaryColor::Off);
        for (row, line) in format_lines(reading).iter().enumerate() {
            let origin = Point::new(0, row as i32 * LINE_HEIGHT);
            let Ok(_) = Text::with_baseline(line, origin, self.style, Baseline::Top)
                .draw(&mut self.panel);
        }
    }

    pub async fn show(&mut self, reading: &Reading) -> Result<(), DisplayError> {
        self.draw(reading);
        self.panel.flush().await
    }

    /// Show every average that arrives. A failed flush is logged and the
    /// next average tries again.
    pub async fn run(mut self, inbox: DisplayReceiver<'_>) -> ! {
        loop {
            let reading = inbox.receive().await;
            if let Err(e) = self.show(&reading).await {
                warn!("Display update failed: {}", e);
            }
        }
    }
}
