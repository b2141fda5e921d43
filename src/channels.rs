use std::fmt::Debug;

use log::{error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{Command, NetworkEvent, VideoMessage};

pub const LED_CHANNEL_CAPACITY: usize = 10;
pub const NETWORK_CHANNEL_CAPACITY: usize = 20;
pub const VIDEO_CHANNEL_CAPACITY: usize = 5;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(default)]
pub struct ChannelCapacities {
    pub led: usize,
    pub network: usize,
    pub video: usize,
}

impl Default for ChannelCapacities {
    fn default() -> Self {
        Self {
            led: LED_CHANNEL_CAPACITY,
            network: NETWORK_CHANNEL_CAPACITY,
            video: VIDEO_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("{0} channel needs a capacity of at least 1")]
    ZeroCapacity(&'static str),
}

#[derive(Clone)]
pub struct Senders {
    pub led: mpsc::Sender<Command>,
    pub network: mpsc::Sender<NetworkEvent>,
    pub video: mpsc::Sender<VideoMessage>,
}

pub struct Receivers {
    pub led: mpsc::Receiver<Command>,
    pub network: mpsc::Receiver<NetworkEvent>,
    pub video: mpsc::Receiver<VideoMessage>,
}

/// The three bounded queues between tasks
pub struct Channels;

impl Channels {
    /// Create every channel up front. Nothing may be spawned if this fails.
    pub fn create(capacities: &ChannelCapacities) -> Result<(Senders, Receivers), ChannelError> {
        for (name, capacity) in [
            ("LED", capacities.led),
            ("network", capacities.network),
            ("video", capacities.video),
        ] {
            if capacity == 0 {
                return Err(ChannelError::ZeroCapacity(name));
            }
        }

        let (led_tx, led_rx) = mpsc::channel(capacities.led);
        let (network_tx, network_rx) = mpsc::channel(capacities.network);
        let (video_tx, video_rx) = mpsc::channel(capacities.video);

        Ok((
            Senders {
                led: led_tx,
                network: network_tx,
                video: video_tx,
            },
            Receivers {
                led: led_rx,
                network: network_rx,
                video: video_rx,
            },
        ))
    }
}

/// Enqueue without waiting. A full or closed channel drops the message and
/// returns false.
pub fn offer<T: Debug>(tx: &mpsc::Sender<T>, message: T, channel: &str) -> bool {
    match tx.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            warn!("{} channel full, dropping {:?}", channel, message);
            false
        }
        Err(TrySendError::Closed(_)) => {
            error!("{} channel closed", channel);
            false
        }
    }
}
