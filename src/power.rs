use std::path::{Path, PathBuf};

use common::BatteryInfo;
use log::{debug, info};

/// Source of the battery figures in status reports
pub trait PowerMonitor: Send {
    fn read(&mut self) -> BatteryInfo;
}

/// Mains powered, nothing to report
pub struct NoBattery;

impl PowerMonitor for NoBattery {
    fn read(&mut self) -> BatteryInfo {
        BatteryInfo::default()
    }
}

/// Linux power supply class device, e.g. `/sys/class/power_supply/BAT0`
pub struct PowerSupply {
    dir: PathBuf,
}

impl PowerSupply {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match std::fs::read_to_string(self.dir.join(name)) {
            Ok(value) => Some(value.trim().to_string()),
            Err(e) => {
                debug!("{}/{}: {}", self.dir.display(), name, e);
                None
            }
        }
    }
}

impl PowerMonitor for PowerSupply {
    fn read(&mut self) -> BatteryInfo {
        // voltage_now is in microvolts
        let battery_voltage = self
            .attribute("voltage_now")
            .and_then(|v| v.parse::<f32>().ok())
            .map(|uv| uv / 1_000_000.0);
        let battery_percentage = self
            .attribute("capacity")
            .and_then(|v| v.parse::<u8>().ok())
            .map(|p| p.min(100));
        let battery_status = self.attribute("status");

        BatteryInfo {
            battery_voltage,
            battery_percentage,
            battery_status,
        }
    }
}

pub fn open_monitor(dir: Option<&Path>) -> Box<dyn PowerMonitor> {
    match dir {
        Some(dir) if dir.is_dir() => {
            info!("Reading battery from {}", dir.display());
            Box::new(PowerSupply::new(dir))
        }
        Some(dir) => {
            info!("No battery at {}, reporting none", dir.display());
            Box::new(NoBattery)
        }
        None => Box::new(NoBattery),
    }
}
