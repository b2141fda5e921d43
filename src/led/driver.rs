use anyhow::Error;
use log::info;
use serde::{Deserialize, Serialize};

#[cfg(feature = "pi")]
use log::warn;
#[cfg(feature = "pi")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use super::Color;

/// Output stage for a strip of addressable pixels. Writes land in a local
/// buffer and only reach the hardware on `flush`.
pub trait LedDriver: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Out of range indices are ignored
    fn set_pixel(&mut self, index: usize, color: Color);

    fn fill(&mut self, color: Color) {
        for index in 0..self.len() {
            self.set_pixel(index, color);
        }
    }

    fn set_brightness(&mut self, level: u8);

    fn flush(&mut self);
}

impl<T: LedDriver + ?Sized> LedDriver for Box<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn set_pixel(&mut self, index: usize, color: Color) {
        (**self).set_pixel(index, color)
    }

    fn fill(&mut self, color: Color) {
        (**self).fill(color)
    }

    fn set_brightness(&mut self, level: u8) {
        (**self).set_brightness(level)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub enum DriverKind {
    /// Keep pixels in memory only
    #[default]
    Memory,
    /// WS2812 chain on SPI0 MOSI
    Spi { rgbw: bool },
}

/// Pixel buffer with no hardware behind it
#[derive(Debug, Clone)]
pub struct MemoryStrip {
    pixels: Vec<Color>,
    brightness: u8,
    flushes: usize,
}

impl MemoryStrip {
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Color::BLACK; len],
            brightness: u8::MAX,
            flushes: 0,
        }
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl LedDriver for MemoryStrip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Color) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level;
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}

/// SPI clock that gives eight SPI bits per WS2812 bit at 800 kHz
#[cfg(feature = "pi")]
const SPI_CLOCK_HZ: u32 = 6_400_000;

/// Bit patterns for a WS2812 zero and one at [`SPI_CLOCK_HZ`]
#[cfg(any(feature = "pi", test))]
const WS2812_ZERO: u8 = 0b1100_0000;
#[cfg(any(feature = "pi", test))]
const WS2812_ONE: u8 = 0b1111_1000;
/// Over 50us low so the chain latches
#[cfg(any(feature = "pi", test))]
const LATCH_BYTES: usize = 48;

/// Expand pixels into the SPI bitstream, GRB(W) order, scaled by brightness
#[cfg(any(feature = "pi", test))]
fn encode_ws2812(pixels: &[Color], brightness: u8, rgbw: bool, out: &mut Vec<u8>) {
    out.clear();
    for pixel in pixels {
        let pixel = pixel.scale(brightness);
        let mut channels = vec![pixel.g, pixel.r, pixel.b];
        if rgbw {
            channels.push(pixel.w);
        }
        for channel in channels {
            for bit in (0..8).rev() {
                out.push(if channel & (1 << bit) != 0 {
                    WS2812_ONE
                } else {
                    WS2812_ZERO
                });
            }
        }
    }
    out.extend(std::iter::repeat(0).take(LATCH_BYTES));
}

#[cfg(feature = "pi")]
pub struct SpiStrip {
    spi: Spi,
    pixels: Vec<Color>,
    brightness: u8,
    rgbw: bool,
    buffer: Vec<u8>,
}

#[cfg(feature = "pi")]
impl SpiStrip {
    pub fn new(len: usize, rgbw: bool) -> Result<Self, Error> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)?;
        Ok(Self {
            spi,
            pixels: vec![Color::BLACK; len],
            brightness: u8::MAX,
            rgbw,
            buffer: Vec::new(),
        })
    }
}

#[cfg(feature = "pi")]
impl LedDriver for SpiStrip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Color) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level;
    }

    fn flush(&mut self) {
        encode_ws2812(&self.pixels, self.brightness, self.rgbw, &mut self.buffer);
        if let Err(e) = self.spi.write(&self.buffer) {
            warn!("LED strip write failed: {}", e);
        }
    }
}

/// Open the driver named in the config
pub fn open_driver(kind: &DriverKind, len: usize) -> Result<Box<dyn LedDriver>, Error> {
    match kind {
        DriverKind::Memory => {
            info!("LED strip: {} pixels in memory", len);
            Ok(Box::new(MemoryStrip::new(len)))
        }
        #[cfg(feature = "pi")]
        DriverKind::Spi { rgbw } => {
            info!("LED strip: {} pixels on SPI0", len);
            Ok(Box::new(SpiStrip::new(len, *rgbw)?))
        }
        #[cfg(not(feature = "pi"))]
        DriverKind::Spi { .. } => {
            anyhow::bail!("SPI LED driver needs the `pi` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_strip_ignores_out_of_range() {
        let mut strip = MemoryStrip::new(2);
        strip.set_pixel(5, Color::rgb(1, 2, 3));
        strip.fill(Color::rgb(4, 5, 6));
        assert_eq!(strip.pixels(), &[Color::rgb(4, 5, 6); 2]);
    }

    #[test]
    fn test_ws2812_encoding() {
        let mut out = Vec::new();
        encode_ws2812(&[Color::rgb(0x80, 0x01, 0x00)], u8::MAX, false, &mut out);
        assert_eq!(out.len(), 24 + LATCH_BYTES);
        // Green first
        assert_eq!(out[7], WS2812_ONE);
        assert_eq!(out[0], WS2812_ZERO);
        // Then red, MSB set
        assert_eq!(out[8], WS2812_ONE);
        assert_eq!(out[9], WS2812_ZERO);
        assert!(out[24..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_memory_driver_without_pi() {
        let driver = open_driver(&DriverKind::Memory, 4).unwrap();
        assert_eq!(driver.len(), 4);
    }
}
