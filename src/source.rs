// source.rs — Frame sources: the external collaborator that feeds the pipeline.
//
// The controller calls `acquire()` once per trigger. An `Err` is always
// treated as transient: the trigger is consumed, no stage runs, and the next
// trigger tries again.

use std::path::{Path, PathBuf};

use crate::error::FrameError;
use crate::frame::Frame;

/// Supplies one frame per pipeline run.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<Frame, FrameError>;
}

/// The same frame on every trigger (still images, tests, benchmarks).
pub struct StaticFrame {
    frame: Frame,
}

impl StaticFrame {
    pub fn new(frame: Frame) -> Self {
        StaticFrame { frame }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl FrameSource for StaticFrame {
    fn acquire(&mut self) -> Result<Frame, FrameError> {
        Ok(self.frame.clone())
    }
}

/// A closure-backed source, handy for synthetic animations.
pub struct FnSource<F>
where
    F: FnMut() -> Result<Frame, FrameError>,
{
    f: F,
}

impl<F> FnSource<F>
where
    F: FnMut() -> Result<Frame, FrameError>,
{
    pub fn new(f: F) -> Self {
        FnSource { f }
    }
}

impl<F> FrameSource for FnSource<F>
where
    F: FnMut() -> Result<Frame, FrameError>,
{
    fn acquire(&mut self) -> Result<Frame, FrameError> {
        (self.f)()
    }
}

/// Image files from a directory, one per trigger, in file-name order.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageSequence {
    const EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];

    /// Collect every PNG/JPEG file in `dir`.
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| Self::EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(Self::from_paths(paths, looping))
    }

    pub fn from_paths(paths: Vec<PathBuf>, looping: bool) -> Self {
        ImageSequence {
            paths,
            next: 0,
            looping,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn acquire(&mut self) -> Result<Frame, FrameError> {
        if self.next >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Err(FrameError::Exhausted);
            }
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;
        let img = image::open(path)?;
        Ok(Frame::from_dynamic_image(&img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_frame_repeats() {
        let mut src = StaticFrame::new(Frame::uniform(2, 2, [0.25; 3]));
        let a = src.acquire().unwrap();
        let b = src.acquire().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fn_source_forwards_errors() {
        let mut calls = 0;
        let mut src = FnSource::new(move || {
            calls += 1;
            if calls == 1 {
                Err(FrameError::NotReady)
            } else {
                Ok(Frame::uniform(1, 1, [0.0; 3]))
            }
        });
        assert!(matches!(src.acquire(), Err(FrameError::NotReady)));
        assert!(src.acquire().is_ok());
    }

    #[test]
    fn empty_sequence_is_exhausted() {
        let mut seq = ImageSequence::from_paths(Vec::new(), true);
        assert!(seq.is_empty());
        assert!(matches!(seq.acquire(), Err(FrameError::Exhausted)));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let mut seq = ImageSequence::from_paths(vec![PathBuf::from("/nonexistent/frame.png")], false);
        assert!(matches!(seq.acquire(), Err(FrameError::Decode(_))));
        assert!(matches!(seq.acquire(), Err(FrameError::Exhausted)));
    }
}
