//! Simulated hardware.
//!
//! The simulated robot uses the same drive and neck logic as the real one,
//! but its motor and servo drivers only record what they were told into a
//! shared `SimJournal`. The camera is synthetic, a looped image directory, or
//! a scripted list of images; the distance sensor reports a fixed range.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::DynamicImage;

use super::{
    Camera, CameraConfig, DistanceSensor, DriveConfig, DriveMotors, FramePacer, HardwareFactory,
    HeadServo, ImageDirCamera, MotorDriver, NeckConfig, ServoChannel, ServoDriver, SteppedNeck,
    SyntheticCamera, WheelDrive, WheelDuty,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimConfig {
    /// Range reported by the simulated distance sensor, meters.
    pub distance_m: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { distance_m: 1.0 }
    }
}

/// Everything the simulated actuators and sensors were asked to do.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimJournal {
    pub wheel_commands: Vec<WheelDuty>,
    pub servo_commands: Vec<(ServoChannel, i32)>,
    pub distance_reads: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SimJournalHandle(Arc<Mutex<SimJournal>>);

impl SimJournalHandle {
    pub fn snapshot(&self) -> SimJournal {
        match self.0.lock() {
            Ok(journal) => journal.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, f: impl FnOnce(&mut SimJournal)) -> Result<()> {
        let mut journal = self
            .0
            .lock()
            .map_err(|_| anyhow!("sim journal lock poisoned"))?;
        f(&mut journal);
        Ok(())
    }
}

pub struct RecordingMotors {
    journal: SimJournalHandle,
}

impl RecordingMotors {
    pub fn new(journal: SimJournalHandle) -> Self {
        Self { journal }
    }
}

impl MotorDriver for RecordingMotors {
    fn set_wheels(&mut self, duty: WheelDuty) -> Result<()> {
        self.journal.record(|j| j.wheel_commands.push(duty))
    }
}

pub struct RecordingServos {
    journal: SimJournalHandle,
}

impl RecordingServos {
    pub fn new(journal: SimJournalHandle) -> Self {
        Self { journal }
    }
}

impl ServoDriver for RecordingServos {
    fn set_angle(&mut self, channel: ServoChannel, angle: i32) -> Result<()> {
        self.journal
            .record(|j| j.servo_commands.push((channel, angle)))
    }
}

pub struct ConstantDistance {
    distance_m: f64,
    journal: SimJournalHandle,
}

impl DistanceSensor for ConstantDistance {
    fn read(&mut self) -> Result<f64> {
        self.journal.record(|j| j.distance_reads += 1)?;
        Ok(self.distance_m)
    }
}

/// Plays a fixed list of images once, then reports end of stream.
pub struct ScriptedCamera {
    images: VecDeque<DynamicImage>,
    pacer: FramePacer,
}

impl ScriptedCamera {
    pub fn new(images: Vec<DynamicImage>, interval: Duration) -> Self {
        Self {
            images: images.into(),
            pacer: FramePacer::new(interval),
        }
    }
}

impl Camera for ScriptedCamera {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capture(&mut self) -> Result<Option<DynamicImage>> {
        if self.images.is_empty() {
            return Ok(None);
        }
        self.pacer.wait();
        Ok(self.images.pop_front())
    }
}

pub struct SimulatedHardware {
    camera: CameraConfig,
    neck: NeckConfig,
    drive: DriveConfig,
    sim: SimConfig,
    script: Mutex<Option<ScriptedCamera>>,
    journal: SimJournalHandle,
}

impl SimulatedHardware {
    pub fn new(camera: CameraConfig, neck: NeckConfig, drive: DriveConfig, sim: SimConfig) -> Self {
        Self {
            camera,
            neck,
            drive,
            sim,
            script: Mutex::new(None),
            journal: SimJournalHandle::default(),
        }
    }

    /// Replace the camera with a scripted one for the next `open_camera`.
    pub fn with_script(self, images: Vec<DynamicImage>, interval: Duration) -> Self {
        Self {
            script: Mutex::new(Some(ScriptedCamera::new(images, interval))),
            ..self
        }
    }

    pub fn journal(&self) -> SimJournalHandle {
        self.journal.clone()
    }
}

impl HardwareFactory for SimulatedHardware {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn open_camera(&self) -> Result<Box<dyn Camera>> {
        let scripted = self
            .script
            .lock()
            .map_err(|_| anyhow!("scripted camera lock poisoned"))?
            .take();
        if let Some(camera) = scripted {
            return Ok(Box::new(camera));
        }
        match &self.camera.mock_images {
            Some(dir) => Ok(Box::new(ImageDirCamera::open(dir, &self.camera)?)),
            None => Ok(Box::new(SyntheticCamera::open(&self.camera)?)),
        }
    }

    fn open_distance_sensor(&self) -> Result<Box<dyn DistanceSensor>> {
        Ok(Box::new(ConstantDistance {
            distance_m: self.sim.distance_m,
            journal: self.journal.clone(),
        }))
    }

    fn open_head(&self) -> Result<Box<dyn HeadServo>> {
        let servos = RecordingServos::new(self.journal.clone());
        Ok(Box::new(SteppedNeck::new(servos, self.neck)?))
    }

    fn open_drive(&self) -> Result<Box<dyn DriveMotors>> {
        let motors = RecordingMotors::new(self.journal.clone());
        Ok(Box::new(WheelDrive::new(motors, self.drive)))
    }
}
