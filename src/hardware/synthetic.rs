//! Synthetic camera for simulated runs.
//!
//! Renders a warm bright disc on a dark background. The disc follows a slow
//! Lissajous path, so consecutive frames move a little and the controller has
//! something to chase. Output is a pure function of the frame index.

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};

use super::{Camera, CameraConfig, FramePacer};

const BACKGROUND: Rgb<u8> = Rgb([18, 18, 28]);
const LIGHT: Rgb<u8> = Rgb([255, 240, 200]);

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_index: u64,
    pacer: FramePacer,
}

impl SyntheticCamera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        log::info!(
            "SyntheticCamera: {}x{} @ {} fps (+wait {:.2}s)",
            config.width,
            config.height,
            config.fps,
            config.warmup.as_secs_f64()
        );
        std::thread::sleep(config.warmup);
        Ok(Self {
            width: config.width,
            height: config.height,
            frame_index: 0,
            pacer: FramePacer::new(config.frame_interval()),
        })
    }

    /// Disc centre for frame `index`, in pixels.
    pub fn light_position(&self, index: u64) -> (f64, f64) {
        let t = index as f64;
        let w = self.width as f64;
        let h = self.height as f64;
        (
            w / 2.0 + 0.35 * w * (t * 0.11).sin(),
            h / 2.0 + 0.30 * h * (t * 0.07 + 0.5).sin(),
        )
    }

    pub fn render(&self, index: u64) -> RgbImage {
        let (cx, cy) = self.light_position(index);
        let radius = self.width.min(self.height) as f64 / 12.0;
        let r2 = radius * radius;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r2 {
                LIGHT
            } else {
                BACKGROUND
            }
        })
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn capture(&mut self) -> Result<Option<DynamicImage>> {
        self.pacer.wait();
        let image = self.render(self.frame_index);
        self.frame_index += 1;
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::vision::BrightnessFocus;
    use std::time::Duration;

    fn config() -> CameraConfig {
        CameraConfig {
            width: 160,
            height: 120,
            fps: 0,
            warmup: Duration::ZERO,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn frames_are_deterministic() -> Result<()> {
        let camera = SyntheticCamera::open(&config())?;
        assert_eq!(camera.render(12), camera.render(12));
        assert_ne!(camera.render(12), camera.render(40));
        Ok(())
    }

    #[test]
    fn focus_tracks_the_disc() -> Result<()> {
        let mut camera = SyntheticCamera::open(&config())?;
        let (cx, cy) = camera.light_position(0);
        let image = camera.capture()?.expect("synthetic camera never ends");
        let frame = Frame::from_image(0, image)?;
        let point = BrightnessFocus::default().locate(&frame)?;
        assert!((point.x - cx).abs() < 2.0, "x {} vs {}", point.x, cx);
        assert!((point.y - cy).abs() < 2.0, "y {} vs {}", point.y, cy);
        Ok(())
    }
}
