use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::mpsc;

use crate::channels::offer;
use crate::{NetworkEvent, VideoMessage};

pub mod decode;
pub mod display;
pub mod media;
pub mod player;

pub use decode::{FrameDecoder, FrameError};
pub use display::{Display, FrameBuffer};
pub use media::{MediaLibrary, ResolveError};
pub use player::{FrameOutcome, PlaybackState, PlaybackStatus, Player, Tick};

/// How long the task waits for a request before advancing playback
pub const VIDEO_POLL: Duration = Duration::from_millis(10);

/// Feeds requests into a [`Player`] and ticks it
pub struct VideoTask<D> {
    player: Player<D>,
    events: mpsc::Sender<NetworkEvent>,
    published: Option<PlaybackStatus>,
}

impl<D: Display> VideoTask<D> {
    pub fn new(player: Player<D>, events: mpsc::Sender<NetworkEvent>) -> Self {
        Self {
            player,
            events,
            published: None,
        }
    }

    pub fn player(&self) -> &Player<D> {
        &self.player
    }

    pub fn handle(&mut self, message: VideoMessage) {
        match message {
            VideoMessage::Playback { request, reply } => {
                let result = self
                    .player
                    .handle(request)
                    .map(str::to_string)
                    .map_err(|e| {
                        warn!("Playback request failed: {}", e);
                        format!("Video error: {}", e)
                    });
                if let Some(reply) = reply {
                    offer(
                        &self.events,
                        NetworkEvent::PlaybackResult { reply, result },
                        "network",
                    );
                }
            }
            VideoMessage::ListMedia { reply } => {
                let entries = self.player.library().list();
                offer(
                    &self.events,
                    NetworkEvent::MediaList { reply, entries },
                    "network",
                );
            }
        }
        self.publish();
    }

    pub fn step(&mut self, now: Instant) -> Tick {
        let tick = self.player.tick(now);
        if tick.finished {
            info!("Playback finished");
        }
        self.publish();
        tick
    }

    /// Send the playback status when it differs from the last one sent
    fn publish(&mut self) {
        let status = self.player.status();
        if self.published.as_ref() == Some(&status) {
            return;
        }
        if offer(&self.events, NetworkEvent::Playback(status.clone()), "network") {
            self.published = Some(status);
        }
    }

    pub async fn run(mut self, mut requests: mpsc::Receiver<VideoMessage>) {
        info!(
            "Video task running, media from {}",
            self.player.library().root().display()
        );
        loop {
            match tokio::time::timeout(VIDEO_POLL, requests.recv()).await {
                Ok(Some(message)) => tokio::task::block_in_place(|| self.handle(message)),
                Ok(None) => {
                    info!("Video channel closed, video task exiting");
                    break;
                }
                Err(_) => {}
            }
            // Decoding blocks, keep it off the async workers
            tokio::task::block_in_place(|| self.step(Instant::now()));
        }
    }
}
