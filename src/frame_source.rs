// src/frame_source.rs
//
// Replays a directory of recorded camera frames (png/jpg, sorted by file
// name) as a FrameSource. A file that fails to decode yields `None` for its
// tick instead of stopping the run.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::interface::FrameSource;
use crate::types::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageSequenceSource {
    pending: VecDeque<PathBuf>,
    loaded: u64,
    failed: u64,
    looping: bool,
    all: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("frame directory {} not found", dir.display()),
            )
            .into());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        info!("🎞️  Found {} frames in {}", files.len(), dir.display());

        Ok(Self {
            pending: files.iter().cloned().collect(),
            loaded: 0,
            failed: 0,
            looping: false,
            all: files,
        })
    }

    /// Restart from the first frame once the sequence runs out.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    fn decode(path: &Path) -> Result<Frame> {
        let img = image::open(path)?.to_rgb8();
        let (w, h) = img.dimensions();
        Frame::from_rgb8(w as usize, h as usize, img.as_raw())
    }
}

impl FrameSource for ImageSequenceSource {
    fn capture(&mut self) -> Option<Frame> {
        if self.pending.is_empty() && self.looping {
            self.pending.extend(self.all.iter().cloned());
        }
        let path = self.pending.pop_front()?;
        match Self::decode(&path) {
            Ok(frame) => {
                self.loaded += 1;
                Some(frame)
            }
            Err(e) => {
                self.failed += 1;
                warn!("⚠️  Skipping frame {}: {}", path.display(), e);
                None
            }
        }
    }
}
