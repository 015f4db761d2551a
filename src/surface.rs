// surface.rs — Presentation surfaces: where a finished render is handed off.

use std::path::PathBuf;

use image::RgbaImage;

use crate::error::PresentError;

/// Receives one rendered image per completed pipeline run.
pub trait Surface {
    fn present(&mut self, image: &RgbaImage) -> Result<(), PresentError>;
}

/// Keeps the most recent image in memory.
#[derive(Default)]
pub struct LatestFrame {
    latest: Option<RgbaImage>,
    presented: u64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&RgbaImage> {
        self.latest.as_ref()
    }

    pub fn take(&mut self) -> Option<RgbaImage> {
        self.latest.take()
    }

    /// Number of images presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Surface for LatestFrame {
    fn present(&mut self, image: &RgbaImage) -> Result<(), PresentError> {
        self.latest = Some(image.clone());
        self.presented += 1;
        Ok(())
    }
}

/// Writes each image as `<dir>/<prefix>_00000.png`, `..._00001.png`, ...
pub struct PngSequence {
    dir: PathBuf,
    prefix: String,
    next: u64,
}

impl PngSequence {
    pub fn create(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(PngSequence {
            dir,
            prefix: prefix.into(),
            next: 0,
        })
    }

    /// Path the next presented image will be written to.
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!("{}_{:05}.png", self.prefix, self.next))
    }
}

impl Surface for PngSequence {
    fn present(&mut self, image: &RgbaImage) -> Result<(), PresentError> {
        let path = self.next_path();
        image.save_with_format(&path, image::ImageFormat::Png)?;
        self.next += 1;
        Ok(())
    }
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn present(&mut self, image: &RgbaImage) -> Result<(), PresentError> {
        (**self).present(image)
    }
}
