//! Off-screen stand-in for the OLED
//!
//! Draws into an `embedded-graphics-simulator` display and writes the frame
//! to a PNG on every flush, so the file always holds the latest average.

use std::convert::Infallible;
use std::path::PathBuf;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettings, OutputSettingsBuilder, SimulatorDisplay,
};
use log::{debug, warn};

use picova_core::display::{DisplayError, HEIGHT, Panel, WIDTH};

const PNG_SCALE: u32 = 3;

pub struct PngPanel {
    display: SimulatorDisplay<BinaryColor>,
    settings: OutputSettings,
    path: PathBuf,
    frames: u32,
}

impl PngPanel {
    pub fn new(path: PathBuf) -> Self {
        Self {
            display: SimulatorDisplay::new(Size::new(WIDTH, HEIGHT)),
            settings: OutputSettingsBuilder::new()
                .theme(BinaryColorTheme::OledBlue)
                .scale(PNG_SCALE)
                .build(),
            path,
            frames: 0,
        }
    }
}

impl Panel for PngPanel {
    async fn flush(&mut self) -> Result<(), DisplayError> {
        let image = self.display.to_rgb_output_image(&self.settings);
        // A failed save only loses this frame
        match image.save_png(&self.path) {
            Ok(()) => {
                self.frames += 1;
                debug!("Frame {} written to {}", self.frames, self.path.display());
            }
            Err(e) => warn!("Could not write {}: {}", self.path.display(), e),
        }
        Ok(())
    }
}

impl OriginDimensions for PngPanel {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl DrawTarget for PngPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.display.clear(color)
    }
}
