use std::path::{Component, Path, PathBuf};

use common::{MediaEntry, MediaKind};
use log::{debug, warn};
use thiserror::Error;

/// Most frames one animation may hold
pub const MAX_FRAMES: usize = 30;

/// Suffixes tried, in order, when a still is named without one
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "JPG", "JPEG"];

pub type FrameList = heapless::Vec<PathBuf, MAX_FRAMES>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("media directory {0} is not available")]
    NoMedia(PathBuf),
    #[error("'{0}' is not a valid media name")]
    InvalidName(String),
    #[error("no image found for '{0}'")]
    NotFound(String),
    #[error("'{0}' has no frames")]
    NoFrames(String),
}

/// What a playback source turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Animation(FrameList),
    Still(PathBuf),
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
        })
}

/// Images on disk, as loose stills or directories of frames
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check(&self, source: &str) -> Result<(), ResolveError> {
        let relative = Path::new(source)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if source.is_empty() || !relative {
            return Err(ResolveError::InvalidName(source.to_string()));
        }
        if !self.root.is_dir() {
            return Err(ResolveError::NoMedia(self.root.clone()));
        }
        Ok(())
    }

    /// Find a single image for `source`: the exact file, then `source`
    /// with each image extension, then the best loose file whose name
    /// starts with `source`.
    pub fn resolve_still(&self, source: &str) -> Result<PathBuf, ResolveError> {
        self.check(source)?;

        let exact = self.root.join(source);
        if is_image(&exact) && exact.is_file() {
            return Ok(exact);
        }

        for ext in IMAGE_EXTENSIONS {
            let candidate = self.root.join(format!("{}.{}", source, ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        let mut matches: Vec<String> = self
            .loose_images()
            .into_iter()
            .filter(|name| name.starts_with(source))
            .collect();
        matches.sort();
        let best = matches
            .iter()
            .find(|name| name.contains("_001"))
            .or_else(|| matches.first());

        match best {
            Some(name) => {
                debug!("'{}' matched {}", source, name);
                Ok(self.root.join(name))
            }
            None => Err(ResolveError::NotFound(source.to_string())),
        }
    }

    /// Frames of the animation directory `source`, ordered by file name.
    /// A source that is not a directory resolves as a still instead.
    pub fn resolve_animation(&self, source: &str) -> Result<Resolved, ResolveError> {
        self.check(source)?;

        let dir = self.root.join(source);
        if !dir.is_dir() {
            return self.resolve_still(source).map(Resolved::Still);
        }

        let mut paths = images_in(&dir);
        if paths.is_empty() {
            return Err(ResolveError::NoFrames(source.to_string()));
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if paths.len() > MAX_FRAMES {
            warn!(
                "'{}' has {} frames, playing the first {}",
                source,
                paths.len(),
                MAX_FRAMES
            );
        }
        let mut frames = FrameList::new();
        for path in paths {
            if frames.push(path).is_err() {
                break;
            }
        }
        Ok(Resolved::Animation(frames))
    }

    /// Everything playable, sorted by name. A missing root lists nothing.
    pub fn list(&self) -> Vec<MediaEntry> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut media: Vec<MediaEntry> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let name = entry.file_name().to_str()?.to_string();
                if path.is_dir() {
                    let frames = images_in(&path).len().min(MAX_FRAMES);
                    (frames > 0).then_some(MediaEntry {
                        name,
                        kind: MediaKind::Animation,
                        frames,
                    })
                } else if is_image(&path) {
                    Some(MediaEntry {
                        name,
                        kind: MediaKind::Still,
                        frames: 1,
                    })
                } else {
                    None
                }
            })
            .collect();
        media.sort_by(|a, b| a.name.cmp(&b.name));
        media
    }

    fn loose_images(&self) -> Vec<String> {
        images_in(&self.root)
            .into_iter()
            .filter_map(|path| Some(path.file_name()?.to_str()?.to_string()))
            .collect()
    }
}

fn images_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image(path))
            .collect(),
        Err(e) => {
            warn!("Could not read {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_still_by_stem() {
        let root = scratch_dir("media-stem");
        touch(&root.join("logo.jpg"));
        touch(&root.join("logo_big.jpg"));

        let library = MediaLibrary::new(&root);
        assert_eq!(library.resolve_still("logo").unwrap(), root.join("logo.jpg"));
        assert_eq!(
            library.resolve_still("logo_big.jpg").unwrap(),
            root.join("logo_big.jpg")
        );
    }

    #[test]
    fn test_still_by_prefix() {
        let root = scratch_dir("media-prefix");
        touch(&root.join("ghost_003.jpg"));
        touch(&root.join("ghost_001.jpg"));
        touch(&root.join("ghost_002.jpeg"));
        touch(&root.join("ghost.txt"));

        let library = MediaLibrary::new(&root);
        assert_eq!(
            library.resolve_still("ghost").unwrap(),
            root.join("ghost_001.jpg")
        );
        assert_eq!(
            library.resolve_still("bat"),
            Err(ResolveError::NotFound("bat".into()))
        );
    }

    #[test]
    fn test_animation_sorted_by_name() {
        let root = scratch_dir("media-sorted");
        let dir = root.join("skull");
        std::fs::create_dir(&dir).unwrap();
        for name in ["b.jpg", "a.jpg", "c.jpg", "notes.txt"] {
            touch(&dir.join(name));
        }

        let library = MediaLibrary::new(&root);
        let Resolved::Animation(frames) = library.resolve_animation("skull").unwrap() else {
            panic!("expected an animation");
        };
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_animation_capped() {
        let root = scratch_dir("media-capped");
        let dir = root.join("long");
        std::fs::create_dir(&dir).unwrap();
        for i in (0..40).rev() {
            touch(&dir.join(format!("frame_{:03}.jpg", i)));
        }

        let library = MediaLibrary::new(&root);
        let Resolved::Animation(frames) = library.resolve_animation("long").unwrap() else {
            panic!("expected an animation");
        };
        assert_eq!(frames.len(), MAX_FRAMES);
        assert_eq!(frames[0], dir.join("frame_000.jpg"));
        assert_eq!(frames[MAX_FRAMES - 1], dir.join("frame_029.jpg"));
    }

    #[test]
    fn test_animation_errors() {
        let root = scratch_dir("media-errors");
        std::fs::create_dir(root.join("empty")).unwrap();
        touch(&root.join("pumpkin.jpg"));

        let library = MediaLibrary::new(&root);
        assert_eq!(
            library.resolve_animation("empty"),
            Err(ResolveError::NoFrames("empty".into()))
        );
        assert_eq!(
            library.resolve_animation("pumpkin").unwrap(),
            Resolved::Still(root.join("pumpkin.jpg"))
        );
        assert_eq!(
            library.resolve_animation("../etc"),
            Err(ResolveError::InvalidName("../etc".into()))
        );
    }

    #[test]
    fn test_missing_root() {
        let library = MediaLibrary::new(scratch_dir("media-missing").join("nope"));
        assert!(matches!(
            library.resolve_still("logo"),
            Err(ResolveError::NoMedia(_))
        ));
        assert!(library.list().is_empty());
    }

    #[test]
    fn test_list() {
        let root = scratch_dir("media-list");
        std::fs::create_dir(root.join("bats")).unwrap();
        touch(&root.join("bats").join("1.jpg"));
        touch(&root.join("bats").join("2.jpg"));
        std::fs::create_dir(root.join("empty")).unwrap();
        touch(&root.join("moon.jpeg"));
        touch(&root.join("readme.md"));

        let library = MediaLibrary::new(&root);
        assert_eq!(
            library.list(),
            vec![
                MediaEntry {
                    name: "bats".into(),
                    kind: MediaKind::Animation,
                    frames: 2
                },
                MediaEntry {
                    name: "moon.jpeg".into(),
                    kind: MediaKind::Still,
                    frames: 1
                },
            ]
        );
    }
}
