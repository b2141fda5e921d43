use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Error};
use common::{DEFAULT_CONTROL_PORT, DEFAULT_STATUS_PORT};
use log::warn;
use pi_pinout::{GpioPin, PhysicalPin, WiringPiPin};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelCapacities;
use crate::dmx::{pack::DMX_MAX_SLOTS, Patch};
use crate::led::DriverKind;
use crate::settings::{keys, SettingsStore};
use crate::video::decode::DEFAULT_FRAME_BUFFER_SIZE;

pub const CONFIG_PATH: &str = "config.ron";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Config {
    pub device: Device,
    pub network: Network,
    pub sacn: Sacn,
    pub leds: Leds,
    pub display: Display,
    pub media: Media,
    pub channels: ChannelCapacities,
    /// Held low for five seconds to wipe stored settings
    pub reset_pin: Option<Pin>,
    /// Power supply class directory to read battery figures from
    pub battery: Option<PathBuf>,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Device {
    pub id: String,
    pub device_type: String,
    pub label: String,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Network {
    pub control_port: u16,
    /// Periodic status reports go here, usually a broadcast address
    pub status_addr: SocketAddr,
    pub status_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Sacn {
    pub enabled: bool,
    pub universe: u16,
    pub start_address: u16,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Leds {
    pub count: usize,
    pub brightness: u8,
    pub driver: DriverKind,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Display {
    pub width: u32,
    pub height: u32,
    /// Linux framebuffer device. Frames stay in memory when unset.
    pub framebuffer: Option<PathBuf>,
    pub brightness: u8,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct Media {
    pub root: PathBuf,
    /// Largest JPEG file accepted, in bytes
    pub frame_buffer_size: usize,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Pin {
    Physical(u8),
    Gpio(u8),
    WiringPi(u8),
}

impl Pin {
    /// BCM number of this pin
    pub fn gpio(self) -> GpioPin {
        match self {
            Pin::Physical(pin) => PhysicalPin(pin).into(),
            Pin::Gpio(pin) => GpioPin(pin),
            Pin::WiringPi(pin) => WiringPiPin(pin).into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::default(),
            network: Network::default(),
            sacn: Sacn::default(),
            leds: Leds::default(),
            display: Display::default(),
            media: Media::default(),
            channels: ChannelCapacities::default(),
            reset_pin: None,
            battery: None,
            log_level: "info".into(),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self {
            id: "prop-001".into(),
            device_type: "prop".into(),
            label: "Prop".into(),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            status_addr: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::BROADCAST,
                DEFAULT_STATUS_PORT,
            )),
            status_interval_secs: 10,
        }
    }
}

impl Default for Sacn {
    fn default() -> Self {
        Self {
            enabled: true,
            universe: 1,
            start_address: 1,
        }
    }
}

impl Default for Leds {
    fn default() -> Self {
        Self {
            count: 30,
            brightness: 128,
            driver: DriverKind::Memory,
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self {
            width: 240,
            height: 320,
            framebuffer: None,
            brightness: 255,
        }
    }
}

impl Default for Media {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            frame_buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        Self::load_from(CONFIG_PATH)
    }

    /// Read a RON config. A missing file gives the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let config = std::fs::read_to_string(path)?;
        let config: Config = ron::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        ensure!(
            (1..=63999).contains(&self.sacn.universe),
            "sACN universe {} is outside 1..=63999",
            self.sacn.universe
        );
        ensure!(
            (1..=DMX_MAX_SLOTS as u16).contains(&self.sacn.start_address),
            "sACN start address {} is outside 1..=512",
            self.sacn.start_address
        );
        ensure!(
            self.patch().slots_needed() <= DMX_MAX_SLOTS,
            "{} LEDs from address {} do not fit in one universe",
            self.leds.count,
            self.sacn.start_address
        );
        ensure!(
            self.media.frame_buffer_size > 0,
            "frame buffer size must be positive"
        );
        Ok(())
    }

    /// Overlay values stored at runtime. Bad values are skipped with a
    /// warning and the file value kept.
    pub fn apply_settings(&mut self, settings: &dyn SettingsStore) {
        if let Some(id) = settings.get(keys::DEVICE_ID) {
            self.device.id = id;
        }
        if let Some(label) = settings.get(keys::DEVICE_LABEL) {
            self.device.label = label;
        }
        override_parsed(settings, keys::SACN_ENABLED, &mut self.sacn.enabled);
        override_parsed(settings, keys::BRIGHTNESS, &mut self.leds.brightness);

        let before = self.sacn.clone();
        override_parsed(settings, keys::SACN_UNIVERSE, &mut self.sacn.universe);
        override_parsed(
            settings,
            keys::SACN_START_ADDRESS,
            &mut self.sacn.start_address,
        );
        if let Err(e) = self.validate() {
            warn!("Ignoring stored sACN patch: {}", e);
            self.sacn.universe = before.universe;
            self.sacn.start_address = before.start_address;
        }
    }

    pub fn patch(&self) -> Patch {
        Patch {
            universe: self.sacn.universe,
            start_address: self.sacn.start_address,
            fixtures: self.leds.count,
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.network.status_interval_secs.max(1))
    }
}

fn override_parsed<T: std::str::FromStr>(settings: &dyn SettingsStore, key: &str, slot: &mut T) {
    if let Some(value) = settings.get(key) {
        match value.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!("Stored setting {} = {:?} is not valid", key, value),
        }
    }
}
