use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Command;

pub mod driver;

pub use driver::{open_driver, DriverKind, LedDriver, MemoryStrip};

/// Update period of the pulse effect
pub const PULSE_TICK: Duration = Duration::from_millis(20);
/// Hue steps in one rainbow pass
pub const RAINBOW_STEPS: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default)]
    pub w: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, w: 0 }
    }

    pub const fn rgbw(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// Fully saturated, full value colour on a 0-255 hue wheel
    pub fn hsv(hue: u8) -> Self {
        Self::hsv_scaled(hue, u8::MAX, u8::MAX)
    }

    pub fn hsv_scaled(hue: u8, saturation: u8, value: u8) -> Self {
        if saturation == 0 {
            return Self::rgb(value, value, value);
        }

        let (h, s, v) = (u16::from(hue), u16::from(saturation), u16::from(value));
        let region = h / 43;
        let remainder = (h - region * 43) * 6;

        let p = (v * (255 - s) / 255) as u8;
        let q = (v * (255 - s * remainder / 255) / 255) as u8;
        let t = (v * (255 - s * (255 - remainder) / 255) / 255) as u8;

        match region {
            0 => Self::rgb(value, t, p),
            1 => Self::rgb(q, value, p),
            2 => Self::rgb(p, value, t),
            3 => Self::rgb(p, q, value),
            4 => Self::rgb(t, p, value),
            _ => Self::rgb(value, p, q),
        }
    }

    /// Scale every channel by `level / 255`
    pub fn scale(self, level: u8) -> Self {
        let scale = |c: u8| ((u16::from(c) * u16::from(level)) / 255) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
            w: scale(self.w),
        }
    }
}

/// Owns the strip and applies [`Command`]s to it in arrival order. Effects
/// run to completion before the next command is read.
pub struct LedRenderer<D> {
    driver: D,
}

impl<D: LedDriver> LedRenderer<D> {
    pub fn new(mut driver: D, brightness: u8) -> Self {
        driver.set_brightness(brightness);
        driver.fill(Color::BLACK);
        driver.flush();
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetColor(color) => {
                self.driver.fill(color);
                self.driver.flush();
            }
            Command::SetBrightness { level } => {
                self.driver.set_brightness(level);
                self.driver.flush();
            }
            Command::SetIndividual { index, color } => {
                if index >= self.driver.len() {
                    debug!("LED {} is past the end of the strip", index);
                    return;
                }
                self.driver.set_pixel(index, color);
                self.driver.flush();
            }
            Command::SetFrame { pixels } => {
                for (index, color) in pixels.into_iter().take(self.driver.len()).enumerate() {
                    self.driver.set_pixel(index, color);
                }
                self.driver.flush();
            }
            Command::ScannerEffect { color, step_delay } => self.scanner(color, step_delay),
            Command::PulseEffect { color, duration } => self.pulse(color, duration),
            Command::RainbowEffect { step_delay } => self.rainbow(step_delay),
        }
    }

    fn scanner(&mut self, color: Color, step_delay: Duration) {
        let len = self.driver.len();
        let forward = 0..len;
        let backward = (1..len.saturating_sub(1)).rev();

        for index in forward.chain(backward) {
            self.driver.fill(Color::BLACK);
            self.driver.set_pixel(index, color);
            self.driver.flush();
            thread::sleep(step_delay);
        }
    }

    fn pulse(&mut self, color: Color, duration: Duration) {
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            let phase = elapsed.as_secs_f32() / duration.as_secs_f32();
            let level = ((phase * TAU).sin() + 1.0) / 2.0;
            self.driver.fill(color.scale((level * 255.0) as u8));
            self.driver.flush();
            thread::sleep(PULSE_TICK);
        }
    }

    fn rainbow(&mut self, step_delay: Duration) {
        let len = self.driver.len();
        if len == 0 {
            return;
        }
        for step in 0..RAINBOW_STEPS {
            for index in 0..len {
                let hue = (index * 256 / len + step) & 0xFF;
                self.driver.set_pixel(index, Color::hsv(hue as u8));
            }
            self.driver.flush();
            thread::sleep(step_delay);
        }
    }

    /// Drain the command channel until every sender is gone
    pub fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("LED task running with {} pixels", self.driver.len());
        while let Some(command) = commands.blocking_recv() {
            debug!("LED command: {:?}", command);
            self.apply(command);
        }
        info!("LED channel closed, LED task exiting");
    }
}

impl<D: LedDriver + 'static> LedRenderer<D> {
    /// Run on a dedicated OS thread, since effects block between frames
    pub fn spawn(
        self,
        commands: mpsc::Receiver<Command>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("led".into())
            .spawn(move || self.run(commands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every flushed frame
    struct Recorder {
        strip: MemoryStrip,
        frames: Vec<Vec<Color>>,
    }

    impl Recorder {
        fn new(len: usize) -> Self {
            Self {
                strip: MemoryStrip::new(len),
                frames: Vec::new(),
            }
        }
    }

    impl LedDriver for Recorder {
        fn len(&self) -> usize {
            self.strip.len()
        }

        fn set_pixel(&mut self, index: usize, color: Color) {
            self.strip.set_pixel(index, color)
        }

        fn set_brightness(&mut self, level: u8) {
            self.strip.set_brightness(level)
        }

        fn flush(&mut self) {
            self.frames.push(self.strip.pixels().to_vec());
        }
    }

    const RED: Color = Color::rgb(255, 0, 0);

    #[test]
    fn test_set_color_fills_strip() {
        let mut renderer = LedRenderer::new(MemoryStrip::new(3), 128);
        renderer.apply(Command::SetColor(RED));
        assert_eq!(renderer.driver().pixels(), &[RED; 3]);
        assert_eq!(renderer.driver().brightness(), 128);
    }

    #[test]
    fn test_individual_out_of_range_dropped() {
        let mut renderer = LedRenderer::new(MemoryStrip::new(3), 255);
        let flushes = renderer.driver().flushes();
        renderer.apply(Command::SetIndividual {
            index: 3,
            color: RED,
        });
        assert_eq!(renderer.driver().flushes(), flushes);
        assert_eq!(renderer.driver().pixels(), &[Color::BLACK; 3]);

        renderer.apply(Command::SetIndividual {
            index: 1,
            color: RED,
        });
        assert_eq!(renderer.driver().pixels()[1], RED);
    }

    #[test]
    fn test_frame_longer_than_strip() {
        let mut renderer = LedRenderer::new(MemoryStrip::new(2), 255);
        renderer.apply(Command::SetFrame {
            pixels: vec![RED, RED, RED, RED],
        });
        assert_eq!(renderer.driver().pixels(), &[RED; 2]);

        renderer.apply(Command::SetFrame {
            pixels: vec![Color::BLACK],
        });
        assert_eq!(renderer.driver().pixels(), &[Color::BLACK, RED]);
    }

    #[test]
    fn test_scanner_sweeps_forward_and_back() {
        let mut renderer = LedRenderer::new(Recorder::new(4), 255);
        renderer.apply(Command::ScannerEffect {
            color: RED,
            step_delay: Duration::ZERO,
        });

        let lit: Vec<usize> = renderer.driver().frames[1..]
            .iter()
            .map(|frame| frame.iter().position(|c| *c == RED).unwrap())
            .collect();
        assert_eq!(lit, vec![0, 1, 2, 3, 2, 1]);
        assert!(renderer.driver().frames[1..]
            .iter()
            .all(|frame| frame.iter().filter(|c| **c == RED).count() == 1));
    }

    #[test]
    fn test_pulse_runs_for_duration() {
        let mut renderer = LedRenderer::new(Recorder::new(1), 255);
        let start = Instant::now();
        renderer.apply(Command::PulseEffect {
            color: Color::rgb(200, 200, 200),
            duration: Duration::from_millis(100),
        });
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(renderer.driver().frames.len() > 2);
    }

    #[test]
    fn test_rainbow_rotates_hues() {
        let mut renderer = LedRenderer::new(Recorder::new(4), 255);
        renderer.apply(Command::RainbowEffect {
            step_delay: Duration::ZERO,
        });

        let frames = &renderer.driver().frames[1..];
        assert_eq!(frames.len(), RAINBOW_STEPS);
        // Pixels are a quarter turn apart
        assert_eq!(
            frames[0],
            vec![
                Color::hsv(0),
                Color::hsv(64),
                Color::hsv(128),
                Color::hsv(192)
            ]
        );
        for (step, frame) in frames.iter().enumerate() {
            assert_eq!(frame[0], Color::hsv(step as u8));
            assert_eq!(frame[1], Color::hsv((64 + step) as u8));
        }
        assert_eq!(frames[255][3], Color::hsv(191));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Color::hsv(0), RED);
        assert_eq!(Color::hsv(86), Color::rgb(0, 255, 0));
        assert_eq!(Color::hsv(172), Color::rgb(0, 0, 255));
        assert_eq!(Color::hsv_scaled(40, 0, 90), Color::rgb(90, 90, 90));
    }

    #[test]
    fn test_commands_applied_in_order() {
        let (tx, rx) = mpsc::channel(10);
        let renderer = LedRenderer::new(MemoryStrip::new(2), 255);
        tx.try_send(Command::SetColor(RED)).unwrap();
        tx.try_send(Command::SetIndividual {
            index: 0,
            color: Color::BLACK,
        })
        .unwrap();
        drop(tx);

        let handle = thread::spawn(move || {
            let mut renderer = renderer;
            let mut rx = rx;
            while let Some(command) = rx.blocking_recv() {
                renderer.apply(command);
            }
            renderer.driver().pixels().to_vec()
        });
        assert_eq!(handle.join().unwrap(), vec![Color::BLACK, RED]);
    }

    #[test]
    fn test_color_scale() {
        assert_eq!(Color::rgb(255, 128, 0).scale(255), Color::rgb(255, 128, 0));
        assert_eq!(Color::rgb(255, 128, 0).scale(0), Color::BLACK);
        assert_eq!(Color::rgbw(255, 0, 0, 255).scale(127).w, 127);
    }
}
