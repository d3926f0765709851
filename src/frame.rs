//! Frame data model.
//!
//! - `Frame`: one numbered image from a frame source, either greyscale or RGB.
//! - Frames are immutable once produced and move by value through the pipeline;
//!   whichever stage holds a frame owns it until it is consumed or discarded.

use anyhow::{anyhow, Result};
use image::DynamicImage;

/// Pixel layout of a frame's sample buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// One 8-bit sample per pixel.
    Grey,
    /// Three interleaved 8-bit samples per pixel (R, G, B).
    Rgb,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Grey => 1,
            PixelLayout::Rgb => 3,
        }
    }
}

/// A numbered image produced by a frame source.
#[derive(Debug)]
pub struct Frame {
    /// Strictly increasing per frame source instance.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    layout: PixelLayout,
    data: Vec<u8>,
}

impl Frame {
    /// Build a greyscale frame, checking the buffer length against the dimensions.
    pub fn grey(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::with_layout(sequence, width, height, PixelLayout::Grey, data)
    }

    /// Build an RGB frame, checking the buffer length against the dimensions.
    pub fn rgb(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::with_layout(sequence, width, height, PixelLayout::Rgb, data)
    }

    fn with_layout(
        sequence: u64,
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame #{} has empty dimensions {}x{}", sequence, width, height));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(layout.channels()))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame #{} length mismatch: expected {}, got {}",
                sequence,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            sequence,
            width,
            height,
            layout,
            data,
        })
    }

    /// Convert a decoded image. Single-channel images stay greyscale, anything
    /// else is flattened to 8-bit RGB.
    pub fn from_image(sequence: u64, image: DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(grey) => {
                let (width, height) = grey.dimensions();
                Self::grey(sequence, width, height, grey.into_raw())
            }
            other => {
                let rgb = other.into_rgb8();
                let (width, height) = rgb.dimensions();
                Self::rgb(sequence, width, height, rgb.into_raw())
            }
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn is_rgb(&self) -> bool {
        self.layout == PixelLayout::Rgb
    }

    /// Interleaved samples, row-major from the top-left pixel.
    pub fn samples(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn rejects_length_mismatch() {
        let err = Frame::rgb(3, 2, 2, vec![0u8; 11]).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(Frame::grey(0, 0, 4, Vec::new()).is_err());
    }

    #[test]
    fn grey_images_stay_single_channel() -> Result<()> {
        let img = GrayImage::from_pixel(4, 3, image::Luma([9u8]));
        let frame = Frame::from_image(7, DynamicImage::ImageLuma8(img))?;
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.layout(), PixelLayout::Grey);
        assert_eq!(frame.samples().len(), 12);
        Ok(())
    }

    #[test]
    fn colour_images_become_rgb() -> Result<()> {
        let img = RgbImage::from_pixel(5, 2, image::Rgb([1u8, 2, 3]));
        let frame = Frame::from_image(1, DynamicImage::ImageRgb8(img).into_rgba8().into())?;
        assert!(frame.is_rgb());
        assert_eq!(frame.width, 5);
        assert_eq!(&frame.samples()[..3], &[1, 2, 3]);
        Ok(())
    }
}
