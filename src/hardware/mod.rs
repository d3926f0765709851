//! Hardware capability interface.
//!
//! The control core only talks to the robot through the narrow traits below.
//! A `HardwareFactory` opens each collaborator inside the stage thread that
//! owns it, so slow initialisation (camera warm-up) and initialisation
//! failures stay local to that stage.
//!
//! Two factories exist, selected once at startup:
//! - `SimulatedHardware`: synthetic or file-backed camera, constant distance,
//!   recording motor/servo drivers.
//! - `RealHardware`: V4L2 camera (feature `camera-v4l2`) plus raw drivers
//!   attached by the embedding application.
//!
//! Implementations MUST return actuators to a neutral state when a motion
//! ends, including when it ends with an error.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::DynamicImage;

use crate::control::HeadPosition;

mod drive;
mod image_dir;
mod neck;
mod real;
mod sim;
mod synthetic;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

pub use drive::{DriveConfig, WheelDrive, WheelDuty};
pub use image_dir::ImageDirCamera;
pub use neck::{NeckConfig, ServoChannel, SteppedNeck};
pub use real::RealHardware;
pub use sim::{
    ConstantDistance, RecordingMotors, RecordingServos, ScriptedCamera, SimConfig, SimJournal,
    SimJournalHandle, SimulatedHardware,
};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Image source. `capture` blocks until the next image is ready.
pub trait Camera: Send {
    fn name(&self) -> &'static str;

    /// Next image, or `None` once a finite source is exhausted.
    fn capture(&mut self) -> Result<Option<DynamicImage>>;
}

/// Range finder facing the direction of travel.
pub trait DistanceSensor: Send {
    /// Distance in meters. May block for the sensor's settle time.
    fn read(&mut self) -> Result<f64>;
}

/// Pan/tilt head.
pub trait HeadServo: Send {
    /// Move to an absolute position, blocking until the motion completes.
    fn move_to(&mut self, target: HeadPosition) -> Result<()>;

    fn center(&mut self) -> Result<()> {
        self.move_to(HeadPosition::default())
    }
}

/// Differential drive body.
pub trait DriveMotors: Send {
    /// Rotate in place; positive turns right. Blocks for the motion.
    fn turn(&mut self, angle_deg: i32) -> Result<()>;

    /// Drive straight; negative speed reverses. Blocks for `duration`.
    fn straight(&mut self, speed: f64, duration: Duration) -> Result<()>;

    /// Stop all wheels immediately.
    fn halt(&mut self) -> Result<()>;
}

/// Four-wheel duty-cycle driver.
pub trait MotorDriver: Send {
    fn set_wheels(&mut self, duty: WheelDuty) -> Result<()>;
}

/// Two-channel angle servo driver; `angle` is the raw servo angle (90 = centre).
pub trait ServoDriver: Send {
    fn set_angle(&mut self, channel: ServoChannel, angle: i32) -> Result<()>;
}

impl<M: MotorDriver + ?Sized> MotorDriver for Box<M> {
    fn set_wheels(&mut self, duty: WheelDuty) -> Result<()> {
        (**self).set_wheels(duty)
    }
}

impl<S: ServoDriver + ?Sized> ServoDriver for Box<S> {
    fn set_angle(&mut self, channel: ServoChannel, angle: i32) -> Result<()> {
        (**self).set_angle(channel, angle)
    }
}

/// Opens the robot's collaborators.
pub trait HardwareFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn open_camera(&self) -> Result<Box<dyn Camera>>;

    fn open_distance_sensor(&self) -> Result<Box<dyn DistanceSensor>>;

    fn open_head(&self) -> Result<Box<dyn HeadServo>>;

    fn open_drive(&self) -> Result<Box<dyn DriveMotors>>;
}

/// Camera settings shared by every camera backend.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Device path for real cameras (e.g. "/dev/video0").
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Horizontal field of view in degrees.
    pub fov_x_deg: f64,
    /// Vertical field of view in degrees.
    pub fov_y_deg: f64,
    /// Time the sensor needs after opening before frames are usable.
    pub warmup: Duration,
    /// Directory of images to loop instead of generating synthetic frames.
    pub mock_images: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 800,
            height: 600,
            fps: 10,
            fov_x_deg: 62.2,
            fov_y_deg: 48.8,
            warmup: Duration::from_millis(1500),
            mock_images: None,
        }
    }
}

impl CameraConfig {
    pub fn frame_interval(&self) -> Duration {
        if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.fps as f64)
        }
    }
}

/// Holds a camera loop to its frame rate.
#[derive(Debug)]
pub(crate) struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Sleep until the next frame slot. Slots missed by a slow consumer are
    /// skipped rather than bunched up.
    pub(crate) fn wait(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let base = self.next_due.map_or(now, |due| due.max(now));
        self.next_due = Some(base + self.interval);
    }
}
