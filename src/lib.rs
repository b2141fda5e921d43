use std::net::SocketAddr;
use std::time::Duration;

use common::{BatteryInfo, MediaEntry};
use led::Color;
use video::PlaybackStatus;

pub mod channels;
pub mod config;
pub mod dmx;
pub mod led;
pub mod network;
pub mod power;
pub mod settings;
pub mod supervisor;
pub mod video;

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::channels::{offer, ChannelCapacities, ChannelError, Channels};
    pub use crate::config::{Config, Pin};
    pub use crate::dmx::{DmxFrame, DmxReceiver, DmxReject, Patch, PriorityState};
    pub use crate::led::{Color, LedDriver, LedRenderer, MemoryStrip};
    pub use crate::network::NetworkTask;
    pub use crate::power::PowerMonitor;
    pub use crate::settings::{RonSettings, SettingsStore};
    pub use crate::supervisor::{Exit, Supervisor};
    pub use crate::video::{Display, FrameBuffer, FrameDecoder, MediaLibrary, Player, VideoTask};
    pub use crate::{Command, NetworkEvent, PlaybackRequest, Reply, VideoMessage};
}

/// Where the answer to a request that finishes on another task should go
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub command_id: String,
    pub addr: SocketAddr,
}

/// Messages for the LED render task
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Paint every pixel
    SetColor(Color),
    /// Global strip brightness
    SetBrightness { level: u8 },
    /// Paint one pixel. Indices past the end of the strip are dropped.
    SetIndividual { index: usize, color: Color },
    /// Paint the first `pixels.len()` pixels in one go. Used for DMX frames
    /// and LED arrays so a whole frame costs a single channel slot.
    SetFrame { pixels: Vec<Color> },
    /// Sweep a single lit pixel forward then back
    ScannerEffect { color: Color, step_delay: Duration },
    /// Sinusoidal brightness ramp over `duration`
    PulseEffect { color: Color, duration: Duration },
    /// One full turn of the colour wheel, spread along the strip
    RainbowEffect { step_delay: Duration },
}

impl Command {
    /// Whether this command competes with DMX for control of the strip
    pub fn is_color_mutating(&self) -> bool {
        !matches!(self, Command::SetBrightness { .. })
    }
}

/// Requests for the video task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackRequest {
    PlayAnimation { source: String, looping: bool },
    DisplayStill { source: String },
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoMessage {
    Playback {
        request: PlaybackRequest,
        reply: Option<Reply>,
    },
    ListMedia {
        reply: Reply,
    },
}

/// Messages flowing back into the network task
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkEvent {
    /// Outcome of a queued playback request
    PlaybackResult {
        reply: Reply,
        result: Result<String, String>,
    },
    /// Media catalogue requested with `list_videos`
    MediaList {
        reply: Reply,
        entries: Vec<MediaEntry>,
    },
    /// Published by the video task whenever playback changes
    Playback(PlaybackStatus),
    /// Published by the supervisor
    Health(BatteryInfo),
}
