//! V4L2 camera.
//!
//! Opens a local video device (e.g. /dev/video0), asks for RGB24 at the
//! configured size and rate, and captures through a memory-mapped stream.
//! The device may negotiate a different size; frames use whatever it reports.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbImage};
use ouroboros::self_referencing;

use super::{Camera, CameraConfig};

const STREAM_BUFFERS: u32 = 4;

#[self_referencing]
struct DeviceStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Camera {
    device_path: String,
    state: DeviceStream,
    width: u32,
    height: u32,
    frames_captured: u64,
}

impl V4l2Camera {
    /// Open and configure the device, then wait out the sensor warm-up.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "v4l2 device {} does not deliver RGB24 (got {})",
                config.device,
                format.fourcc
            ));
        }

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", config.device, err);
            }
        }

        let state = DeviceStreamBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Camera: connected to {} ({}x{}, +wait {:.2}s)",
            config.device,
            format.width,
            format.height,
            config.warmup.as_secs_f64()
        );
        std::thread::sleep(config.warmup);

        Ok(Self {
            device_path: config.device.clone(),
            state,
            width: format.width,
            height: format.height,
            frames_captured: 0,
        })
    }
}

impl Camera for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn capture(&mut self) -> Result<Option<DynamicImage>> {
        use v4l::io::traits::CaptureStream;

        let (width, height) = (self.width, self.height);
        let pixels = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .with_context(|| format!("capture v4l2 frame from {}", self.device_path))?;
        let expected = width as usize * height as usize * 3;
        if pixels.len() < expected {
            return Err(anyhow!(
                "short v4l2 frame: expected {} bytes, got {}",
                expected,
                pixels.len()
            ));
        }
        let mut pixels = pixels;
        pixels.truncate(expected);
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("v4l2 frame does not fit {}x{}", width, height))?;
        self.frames_captured += 1;
        log::trace!("V4l2Camera: frame {} from {}", self.frames_captured, self.device_path);
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }
}
