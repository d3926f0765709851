//! Real robot hardware.
//!
//! The camera is opened through V4L2 when the `camera-v4l2` feature is
//! enabled. Motor, servo and range-finder access is board specific and is
//! attached by the embedding application; each driver can be opened once.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::{
    Camera, CameraConfig, DistanceSensor, DriveConfig, DriveMotors, HardwareFactory, HeadServo,
    MotorDriver, NeckConfig, ServoDriver, SteppedNeck, WheelDrive,
};

#[derive(Default)]
struct Drivers {
    motors: Option<Box<dyn MotorDriver>>,
    servos: Option<Box<dyn ServoDriver>>,
    distance: Option<Box<dyn DistanceSensor>>,
}

pub struct RealHardware {
    camera: CameraConfig,
    neck: NeckConfig,
    drive: DriveConfig,
    drivers: Mutex<Drivers>,
}

impl RealHardware {
    pub fn new(camera: CameraConfig, neck: NeckConfig, drive: DriveConfig) -> Self {
        Self {
            camera,
            neck,
            drive,
            drivers: Mutex::new(Drivers::default()),
        }
    }

    pub fn with_motor_driver(self, driver: Box<dyn MotorDriver>) -> Self {
        self.attach(|d| d.motors = Some(driver))
    }

    pub fn with_servo_driver(self, driver: Box<dyn ServoDriver>) -> Self {
        self.attach(|d| d.servos = Some(driver))
    }

    pub fn with_distance_sensor(self, sensor: Box<dyn DistanceSensor>) -> Self {
        self.attach(|d| d.distance = Some(sensor))
    }

    fn attach(self, f: impl FnOnce(&mut Drivers)) -> Self {
        let mut drivers = match self.drivers.into_inner() {
            Ok(drivers) => drivers,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut drivers);
        Self {
            camera: self.camera,
            neck: self.neck,
            drive: self.drive,
            drivers: Mutex::new(drivers),
        }
    }

    fn take<T>(&self, what: &str, pick: impl FnOnce(&mut Drivers) -> Option<T>) -> Result<T> {
        let mut drivers = self
            .drivers
            .lock()
            .map_err(|_| anyhow!("hardware driver lock poisoned"))?;
        pick(&mut drivers).ok_or_else(|| anyhow!("no {} attached (or already in use)", what))
    }
}

impl HardwareFactory for RealHardware {
    fn name(&self) -> &'static str {
        "real"
    }

    #[cfg(feature = "camera-v4l2")]
    fn open_camera(&self) -> Result<Box<dyn Camera>> {
        Ok(Box::new(super::V4l2Camera::open(&self.camera)?))
    }

    #[cfg(not(feature = "camera-v4l2"))]
    fn open_camera(&self) -> Result<Box<dyn Camera>> {
        Err(anyhow!(
            "camera {} requires the camera-v4l2 feature",
            self.camera.device
        ))
    }

    fn open_distance_sensor(&self) -> Result<Box<dyn DistanceSensor>> {
        self.take("distance sensor", |d| d.distance.take())
    }

    fn open_head(&self) -> Result<Box<dyn HeadServo>> {
        let servos = self.take("servo driver", |d| d.servos.take())?;
        Ok(Box::new(SteppedNeck::new(servos, self.neck)?))
    }

    fn open_drive(&self) -> Result<Box<dyn DriveMotors>> {
        let motors = self.take("motor driver", |d| d.motors.take())?;
        Ok(Box::new(WheelDrive::new(motors, self.drive)))
    }
}
