use std::time::Duration;

use anyhow::Result;

use super::{HeadServo, ServoDriver};
use crate::control::{HeadBounds, HeadPosition};

/// Raw servo angle that points a joint straight ahead.
const SERVO_CENTRE_DEG: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServoChannel {
    /// Horizontal (pan) joint.
    Pan,
    /// Vertical (tilt) joint.
    Tilt,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeckConfig {
    /// Mounting calibration added to every pan command, degrees.
    pub offset_h_deg: f64,
    /// Mounting calibration added to every tilt command, degrees.
    pub offset_v_deg: f64,
    /// Largest movement per tick on each axis.
    pub step_deg: i32,
    pub step_interval: Duration,
    pub bounds: HeadBounds,
}

impl Default for NeckConfig {
    fn default() -> Self {
        Self {
            offset_h_deg: 6.0,
            offset_v_deg: -23.0,
            step_deg: 2,
            step_interval: Duration::from_millis(20),
            bounds: HeadBounds::default(),
        }
    }
}

/// Pan/tilt head that walks toward each target in small steps.
pub struct SteppedNeck<S: ServoDriver> {
    driver: S,
    config: NeckConfig,
    position: HeadPosition,
}

impl<S: ServoDriver> SteppedNeck<S> {
    /// Take ownership of the servos and centre the head.
    pub fn new(driver: S, config: NeckConfig) -> Result<Self> {
        let mut neck = Self {
            driver,
            config,
            position: HeadPosition::default(),
        };
        log::info!(
            "neck to zero (offset h={:+.1} v={:+.1})",
            config.offset_h_deg,
            config.offset_v_deg
        );
        neck.write(HeadPosition::default())?;
        Ok(neck)
    }

    /// Last commanded position.
    pub fn position(&self) -> HeadPosition {
        self.position
    }

    fn write(&mut self, position: HeadPosition) -> Result<()> {
        let pan = (position.h_deg as f64 + SERVO_CENTRE_DEG + self.config.offset_h_deg).round();
        let tilt = (position.v_deg as f64 + SERVO_CENTRE_DEG + self.config.offset_v_deg).round();
        self.driver.set_angle(ServoChannel::Pan, pan as i32)?;
        self.driver.set_angle(ServoChannel::Tilt, tilt as i32)?;
        self.position = position;
        Ok(())
    }
}

impl<S: ServoDriver> HeadServo for SteppedNeck<S> {
    fn move_to(&mut self, target: HeadPosition) -> Result<()> {
        let target = self.config.bounds.clamp(target);
        let step = self.config.step_deg.max(1);
        log::debug!("neck {:?} -> {:?}", self.position, target);
        while self.position != target {
            let next = HeadPosition {
                h_deg: step_toward(self.position.h_deg, target.h_deg, step),
                v_deg: step_toward(self.position.v_deg, target.v_deg, step),
            };
            self.write(next)?;
            if next != target && !self.config.step_interval.is_zero() {
                std::thread::sleep(self.config.step_interval);
            }
        }
        Ok(())
    }
}

fn step_toward(from: i32, to: i32, step: i32) -> i32 {
    from + (to - from).clamp(-step, step)
}
