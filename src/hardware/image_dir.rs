//! Looped image-directory camera.
//!
//! Replays previously captured images (png, jpeg or bmp) in file-name order,
//! wrapping around at the end, paced like a live camera. Files are decoded on
//! each capture; a file that fails to decode is reported for that capture only.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;

use super::{Camera, CameraConfig, FramePacer};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug)]
pub struct ImageDirCamera {
    paths: Vec<PathBuf>,
    next: usize,
    pacer: FramePacer,
}

impl ImageDirCamera {
    pub fn open(dir: &Path, config: &CameraConfig) -> Result<Self> {
        let paths = list_images(dir)?;
        if paths.is_empty() {
            return Err(anyhow!("no images found in {}", dir.display()));
        }
        log::info!(
            "ImageDirCamera: looping {} images from {} @ {} fps",
            paths.len(),
            dir.display(),
            config.fps
        );
        Ok(Self {
            paths,
            next: 0,
            pacer: FramePacer::new(config.frame_interval()),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Camera for ImageDirCamera {
    fn name(&self) -> &'static str {
        "image-dir"
    }

    fn capture(&mut self) -> Result<Option<DynamicImage>> {
        self.pacer.wait();
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        let image = image::open(path).with_context(|| format!("decode {}", path.display()))?;
        Ok(Some(image))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read image dir {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::time::Duration;

    fn config() -> CameraConfig {
        CameraConfig {
            fps: 0,
            warmup: Duration::ZERO,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn loops_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            GrayImage::from_pixel(3, 2, Luma([value])).save(dir.path().join(name))?;
        }
        std::fs::write(dir.path().join("notes.txt"), "not an image")?;

        let mut camera = ImageDirCamera::open(dir.path(), &config())?;
        assert_eq!(camera.len(), 3);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let image = camera.capture()?.expect("looping camera never ends");
            seen.push(image.to_luma8().get_pixel(0, 0).0[0]);
        }
        assert_eq!(seen, vec![10, 20, 30, 10]);
        Ok(())
    }

    #[test]
    fn empty_directory_is_an_init_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ImageDirCamera::open(dir.path(), &config()).is_err());
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_init_error() {
        let err = ImageDirCamera::open(Path::new("/nonexistent/frames"), &config()).unwrap_err();
        assert!(err.to_string().contains("read image dir"));
    }
}
