use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::Rgb;
use log::{debug, info, warn};

use super::decode::FrameDecoder;
use super::display::{centered, Display};
use super::media::{FrameList, MediaLibrary, ResolveError, Resolved};
use crate::PlaybackRequest;

/// Roughly 30 frames per second
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Resolved frames plus a cursor into them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    source: String,
    frames: FrameList,
    looping: bool,
    cursor: usize,
}

impl FrameSet {
    pub fn animation(source: impl Into<String>, frames: FrameList, looping: bool) -> Self {
        Self {
            source: source.into(),
            frames,
            looping,
            cursor: 0,
        }
    }

    pub fn still(source: impl Into<String>, path: PathBuf) -> Self {
        let mut frames = FrameList::new();
        // A fresh list always has room for one
        let _ = frames.push(path);
        Self {
            source: source.into(),
            frames,
            looping: false,
            cursor: 0,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    fn current(&self) -> Option<&PathBuf> {
        self.frames.get(self.cursor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// Resolving a request
    Loading,
    Still { set: FrameSet, shown: bool },
    Animation {
        set: FrameSet,
        last_frame_at: Option<Instant>,
    },
    Stopped,
}

/// Published to the network task whenever it changes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub playing: bool,
    pub current: String,
    pub looping: bool,
    pub frame: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(PathBuf),
    /// The frame could not be loaded and was passed over
    Skipped(PathBuf),
}

/// What one call to [`Player::tick`] did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tick {
    pub frame: Option<FrameOutcome>,
    pub looped: bool,
    pub finished: bool,
}

/// Playback state machine. Every tick attempts at most one frame.
pub struct Player<D> {
    display: D,
    decoder: FrameDecoder,
    library: MediaLibrary,
    state: PlaybackState,
}

impl<D: Display> Player<D> {
    pub fn new(mut display: D, decoder: FrameDecoder, library: MediaLibrary) -> Self {
        display.clear();
        Self {
            display,
            decoder,
            library,
            state: PlaybackState::Idle,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Start, replace or stop playback. On failure whatever was playing
    /// keeps playing.
    pub fn handle(&mut self, request: PlaybackRequest) -> Result<&'static str, ResolveError> {
        match request {
            PlaybackRequest::PlayAnimation { source, looping } => {
                let previous = std::mem::replace(&mut self.state, PlaybackState::Loading);
                match self.library.resolve_animation(&source) {
                    Ok(Resolved::Animation(frames)) => {
                        info!(
                            "Playing '{}' ({} frames{})",
                            source,
                            frames.len(),
                            if looping { ", looping" } else { "" }
                        );
                        self.state = PlaybackState::Animation {
                            set: FrameSet::animation(source, frames, looping),
                            last_frame_at: None,
                        };
                        Ok("Video playback started")
                    }
                    Ok(Resolved::Still(path)) => {
                        info!("'{}' is not an animation, showing {}", source, path.display());
                        self.state = PlaybackState::Still {
                            set: FrameSet::still(source, path),
                            shown: false,
                        };
                        Ok("Video playback started")
                    }
                    Err(e) => {
                        self.state = previous;
                        Err(e)
                    }
                }
            }
            PlaybackRequest::DisplayStill { source } => {
                let previous = std::mem::replace(&mut self.state, PlaybackState::Loading);
                match self.library.resolve_still(&source) {
                    Ok(path) => {
                        info!("Showing {}", path.display());
                        self.state = PlaybackState::Still {
                            set: FrameSet::still(source, path),
                            shown: false,
                        };
                        Ok("Image displayed")
                    }
                    Err(e) => {
                        self.state = previous;
                        Err(e)
                    }
                }
            }
            PlaybackRequest::Stop => {
                self.stop();
                Ok("Video stopped")
            }
        }
    }

    fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            debug!("Playback stopped");
        }
        self.display.clear();
        self.state = PlaybackState::Stopped;
    }

    /// Advance playback. Animations move one frame per [`FRAME_INTERVAL`];
    /// a still is drawn once and then held.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let mut tick = Tick::default();

        match &mut self.state {
            PlaybackState::Still { set, shown } => {
                if *shown {
                    return tick;
                }
                *shown = true;
                let Some(path) = set.current().cloned() else {
                    return tick;
                };
                let outcome = render(&mut self.display, &mut self.decoder, &path);
                tick.finished = matches!(outcome, FrameOutcome::Skipped(_));
                tick.frame = Some(outcome);
            }
            PlaybackState::Animation { set, last_frame_at } => {
                let due = last_frame_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= FRAME_INTERVAL);
                if !due {
                    return tick;
                }
                let Some(path) = set.current().cloned() else {
                    return tick;
                };
                tick.frame = Some(render(&mut self.display, &mut self.decoder, &path));
                *last_frame_at = Some(now);

                set.cursor += 1;
                if set.cursor >= set.len() {
                    if set.looping {
                        set.cursor = 0;
                        tick.looped = true;
                    } else {
                        tick.finished = true;
                    }
                }
            }
            PlaybackState::Idle | PlaybackState::Loading | PlaybackState::Stopped => {}
        }

        if tick.finished {
            self.stop();
        }
        tick
    }

    pub fn status(&self) -> PlaybackStatus {
        match &self.state {
            PlaybackState::Still { set, .. } => PlaybackStatus {
                playing: true,
                current: set.source.clone(),
                looping: false,
                frame: 0,
            },
            PlaybackState::Animation { set, .. } => PlaybackStatus {
                playing: true,
                current: set.source.clone(),
                looping: set.looping,
                frame: set.cursor,
            },
            _ => PlaybackStatus::default(),
        }
    }
}

/// Decode `path` and draw it centred on a black background
fn render<D: Display>(display: &mut D, decoder: &mut FrameDecoder, path: &Path) -> FrameOutcome {
    match decoder.decode(path) {
        Ok(frame) => {
            let (x, y) = centered(display.dimensions(), frame.dimensions());
            display.fill(Rgb([0, 0, 0]));
            display.draw(x, y, &frame);
            display.flush();
            FrameOutcome::Rendered(path.to_path_buf())
        }
        Err(e) => {
            warn!("Skipping frame: {}", e);
            FrameOutcome::Skipped(path.to_path_buf())
        }
    }
}
