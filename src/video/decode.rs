use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use thiserror::Error;

pub const DEFAULT_FRAME_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("could not open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is {size} bytes, over the {limit} byte frame buffer")]
    TooLarge {
        path: PathBuf,
        size: u64,
        limit: usize,
    },
    #[error("could not decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// JPEG decoder reading through one reusable, bounded buffer
pub struct FrameDecoder {
    buffer: Vec<u8>,
    limit: usize,
}

impl FrameDecoder {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn decode(&mut self, path: &Path) -> Result<RgbImage, FrameError> {
        let open_error = |source| FrameError::Open {
            path: path.to_path_buf(),
            source,
        };
        let too_large = |size| FrameError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: self.limit,
        };

        let file = File::open(path).map_err(open_error)?;
        let size = file.metadata().map_err(open_error)?.len();
        if size > self.limit as u64 {
            return Err(too_large(size));
        }

        self.buffer.clear();
        // One extra byte catches a file that grew after the size check
        file.take(self.limit as u64 + 1)
            .read_to_end(&mut self.buffer)
            .map_err(open_error)?;
        if self.buffer.len() > self.limit {
            return Err(too_large(self.buffer.len() as u64));
        }

        let image = image::load_from_memory_with_format(&self.buffer, ImageFormat::Jpeg).map_err(
            |source| FrameError::Decode {
                path: path.to_path_buf(),
                source,
            },
        )?;
        Ok(image.to_rgb8())
    }
}
