//! Camera capture sources
//!
//! Capture drivers live outside this service. `SnapshotCamera` reads the
//! still that an external grabber (v4l2/ffmpeg/etc.) keeps overwriting at a
//! fixed path.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// A source of camera frames, owned by exactly one monitor
#[async_trait]
pub trait CameraSource: Send {
    /// Grab the current frame
    async fn capture(&mut self) -> Result<DynamicImage>;
}

/// Camera backed by a continuously refreshed image file
#[derive(Debug)]
pub struct SnapshotCamera {
    path: PathBuf,
}

impl SnapshotCamera {
    /// Open the snapshot source
    ///
    /// # Errors
    /// `DeviceUnavailable` when the snapshot file does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::DeviceUnavailable(format!(
                "Camera snapshot not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl CameraSource for SnapshotCamera {
    async fn capture(&mut self) -> Result<DynamicImage> {
        // The grabber may be mid-write; a bad read only costs this frame
        let bytes = tokio::fs::read(&self.path).await?;
        image::load_from_memory(&bytes)
            .map_err(|e| Error::TransientSample(format!("Undecodable camera frame: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_is_device_unavailable() {
        let result = SnapshotCamera::open(Path::new("/nonexistent/mindguard/frame.jpg"));
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_capture_reads_current_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::new(6, 4).save_with_format(&path, ImageFormat::Png).unwrap();

        let mut camera = SnapshotCamera::open(&path).unwrap();
        let frame = camera.capture().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (6, 4));

        std::fs::write(&path, b"partial write").unwrap();
        assert!(matches!(camera.capture().await, Err(Error::TransientSample(_))));
    }
}
