use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use image::{Rgb, RgbImage};
use log::{info, warn};

/// Surface that playback draws frames onto
pub trait Display: Send {
    fn dimensions(&self) -> (u32, u32);

    fn fill(&mut self, color: Rgb<u8>);

    /// Copy `frame` with its top left corner at (x, y), clipped to the
    /// surface
    fn draw(&mut self, x: u32, y: u32, frame: &RgbImage);

    fn flush(&mut self);

    fn set_brightness(&mut self, level: u8);

    fn clear(&mut self) {
        self.fill(Rgb([0, 0, 0]));
        self.flush();
    }
}

/// Offset that centres `image` on `display`. Oversized images are pinned to
/// the top left corner.
pub fn centered(display: (u32, u32), image: (u32, u32)) -> (u32, u32) {
    (
        display.0.saturating_sub(image.0) / 2,
        display.1.saturating_sub(image.1) / 2,
    )
}

/// In-memory canvas, optionally mirrored to a 16 bit Linux framebuffer
pub struct FrameBuffer {
    canvas: RgbImage,
    device: Option<PathBuf>,
    brightness: u8,
    flushes: usize,
    scratch: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, device: Option<PathBuf>) -> Self {
        if let Some(device) = &device {
            info!("Display: {}x{} on {}", width, height, device.display());
        }
        Self {
            canvas: RgbImage::new(width, height),
            device,
            brightness: u8::MAX,
            flushes: 0,
            scratch: Vec::new(),
        }
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }
}

/// Little-endian RGB565
fn rgb565(pixel: &Rgb<u8>, brightness: u8) -> [u8; 2] {
    let scale = |c: u8| u16::from(c) * u16::from(brightness) / 255;
    let [r, g, b] = pixel.0;
    let value = ((scale(r) >> 3) << 11) | ((scale(g) >> 2) << 5) | (scale(b) >> 3);
    value.to_le_bytes()
}

impl Display for FrameBuffer {
    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn fill(&mut self, color: Rgb<u8>) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = color;
        }
    }

    fn draw(&mut self, x: u32, y: u32, frame: &RgbImage) {
        let (width, height) = self.canvas.dimensions();
        for (fx, fy, pixel) in frame.enumerate_pixels() {
            let (cx, cy) = (x + fx, y + fy);
            if cx < width && cy < height {
                self.canvas.put_pixel(cx, cy, *pixel);
            }
        }
    }

    fn flush(&mut self) {
        self.flushes += 1;
        let Some(device) = &self.device else {
            return;
        };

        self.scratch.clear();
        for pixel in self.canvas.pixels() {
            self.scratch.extend_from_slice(&rgb565(pixel, self.brightness));
        }
        let written = OpenOptions::new()
            .write(true)
            .open(device)
            .and_then(|mut fb| fb.write_all(&self.scratch));
        if let Err(e) = written {
            warn!("Could not write frame to {}: {}", device.display(), e);
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level;
    }
}
