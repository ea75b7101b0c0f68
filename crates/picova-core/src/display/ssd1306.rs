//! 128x64 SSD1306 OLED over I2C
//!
//! Drawing lands in a RAM framebuffer laid out like the controller's display
//! RAM (8 pages of 128 columns, one byte per 8 vertical pixels). A flush
//! sends the whole buffer as a single data transfer.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_hal_async::i2c::{Error as _, I2c, Operation};
use log::debug;

use super::framing::{CONTROL_DATA, Framer};
use super::{DisplayError, Panel};

/// 7-bit address with SA0 low
pub const SSD1306_ADDRESS: u8 = 0x3C;

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 64;
const PAGES: usize = HEIGHT as usize / 8;
const BUFFER_LEN: usize = WIDTH as usize * PAGES;

const COMMAND_RUN_MAX: usize = 32;

const DISPLAY_OFF: u8 = 0xAE;
const DISPLAY_ON: u8 = 0xAF;
const SET_COLUMN_RANGE: u8 = 0x21;
const SET_PAGE_RANGE: u8 = 0x22;
const SEG_REMAP_NORMAL: u8 = 0xA0;
const SEG_REMAP_MIRRORED: u8 = 0xA1;
const COM_SCAN_UP: u8 = 0xC0;
const COM_SCAN_DOWN: u8 = 0xC8;

/// Power-up sequence up to, but not including, the orientation commands
const INIT_HEAD: &[u8] = &[
    DISPLAY_OFF,
    0xD5, 0x80, // clock divide
    0xA8, 0x3F, // multiplex 64
    0xD3, 0x00, // no display offset
    0x40,       // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
];

const INIT_TAIL: &[u8] = &[
    0xDA, 0x12, // alternative COM pins
    0x81, 0xCF, // contrast
    0xD9, 0xF1, // pre-charge
    0xDB, 0x40, // VCOMH deselect
    0xA4,       // follow RAM
    0xA6,       // not inverted
    DISPLAY_ON,
];

pub struct Ssd1306<I> {
    i2c: I,
    address: u8,
    rotated: bool,
    framer: Framer<COMMAND_RUN_MAX>,
    buffer: [u8; BUFFER_LEN],
    dirty: bool,
}

impl<I: I2c> Ssd1306<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            rotated: false,
            framer: Framer::new(),
            buffer: [0; BUFFER_LEN],
            dirty: true,
        }
    }

    /// Mount the panel upside down. Takes effect on [`Self::init`].
    pub fn rotated(mut self, rotated: bool) -> Self {
        self.rotated = rotated;
        self
    }

    pub async fn init(&mut self) -> Result<(), DisplayError> {
        let (segment, scan) = if self.rotated {
            (SEG_REMAP_NORMAL, COM_SCAN_UP)
        } else {
            (SEG_REMAP_MIRRORED, COM_SCAN_DOWN)
        };

        self.commands(INIT_HEAD).await?;
        self.commands(&[segment, scan]).await?;
        self.commands(INIT_TAIL).await?;
        self.end().await?;

        debug!("SSD1306@{:#04x}: initialized", self.address);
        Ok(())
    }

    /// Raw display RAM, page major
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        let idx = (y / 8) * WIDTH as usize + x;
        let bit = 1 << (y % 8);
        let old = self.buffer[idx];
        let new = if on { old | bit } else { old & !bit };
        if new != old {
            self.buffer[idx] = new;
            self.dirty = true;
        }
    }

    async fn commands(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        for &byte in bytes {
            if let Some(run) = self.framer.command(byte) {
                self.write(&run).await?;
            }
        }
        Ok(())
    }

    async fn end(&mut self) -> Result<(), DisplayError> {
        match self.framer.end() {
            Some(run) => self.write(&run).await,
            None => Ok(()),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.i2c
            .write(self.address, bytes)
            .await
            .map_err(|e| DisplayError::Bus(e.kind()))
    }

    async fn write_buffer(&mut self) -> Result<(), DisplayError> {
        if let Some(run) = self.framer.begin_data() {
            self.write(&run).await?;
        }
        let result = self
            .i2c
            .transaction(
                self.address,
                &mut [
                    Operation::Write(&[CONTROL_DATA]),
                    Operation::Write(&self.buffer),
                ],
            )
            .await
            .map_err(|e| DisplayError::Bus(e.kind()));
        self.framer.end();
        result
    }
}

impl<I: I2c> Panel for Ssd1306<I> {
    /// Send the framebuffer if anything changed since the last flush.
    async fn flush(&mut self) -> Result<(), DisplayError> {
        if !self.dirty {
            return Ok(());
        }

        self.commands(&[SET_COLUMN_RANGE, 0, WIDTH as u8 - 1])
            .await?;
        self.commands(&[SET_PAGE_RANGE, 0, PAGES as u8 - 1]).await?;
        self.write_buffer().await?;

        self.dirty = false;
        Ok(())
    }
}

impl<I> OriginDimensions for Ssd1306<I> {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl<I: I2c> DrawTarget for Ssd1306<I> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<P>(&mut self, pixels: P) -> Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if let (Ok(x), Ok(y)) = (usize::try_from(coord.x), usize::try_from(coord.y)) {
                if x < WIDTH as usize && y < HEIGHT as usize {
                    self.set_pixel(x, y, color.is_on());
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = if color.is_on() { 0xFF } else { 0x00 };
        if self.buffer.iter().any(|&b| b != fill) {
            self.buffer.fill(fill);
            self.dirty = true;
        }
        Ok(())
    }
}
