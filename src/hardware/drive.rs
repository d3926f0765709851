use std::time::Duration;

use anyhow::Result;

use super::{DriveMotors, MotorDriver};

/// Signed duty per wheel, already scaled by the drive gain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WheelDuty {
    pub left_upper: i32,
    pub left_lower: i32,
    pub right_upper: i32,
    pub right_lower: i32,
}

impl WheelDuty {
    pub const STOP: WheelDuty = WheelDuty {
        left_upper: 0,
        left_lower: 0,
        right_upper: 0,
        right_lower: 0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveConfig {
    /// Multiplier from speed units to motor duty.
    pub gain: f64,
    /// Seconds of turning per 90 degrees.
    pub turn_secs_per_90: f64,
    /// Speed of the wheels on the outside of a turn.
    pub turn_forward: f64,
    /// Speed of the wheels on the inside of a turn (negative spins them backwards).
    pub turn_reverse: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            gain: 400.0,
            turn_secs_per_90: 0.7,
            turn_forward: 5.0,
            turn_reverse: -4.0,
        }
    }
}

/// Timed drive on top of a raw four-wheel motor driver.
pub struct WheelDrive<M: MotorDriver> {
    driver: M,
    config: DriveConfig,
}

impl<M: MotorDriver> WheelDrive<M> {
    pub fn new(driver: M, config: DriveConfig) -> Self {
        Self { driver, config }
    }

    pub fn turn_duration(&self, angle_deg: i32) -> Duration {
        Duration::from_secs_f64((angle_deg as f64 * self.config.turn_secs_per_90 / 90.0).abs())
    }

    /// Apply per-wheel speeds (left upper, left lower, right upper, right lower)
    /// for `duration`, then stop.
    fn run(&mut self, speeds: [f64; 4], duration: Duration) -> Result<()> {
        let gain = self.config.gain;
        let duty = WheelDuty {
            left_upper: (gain * speeds[0]).round() as i32,
            left_lower: (gain * speeds[1]).round() as i32,
            right_upper: (gain * speeds[2]).round() as i32,
            right_lower: (gain * speeds[3]).round() as i32,
        };
        log::info!("move {:?} for {:.2}s", speeds, duration.as_secs_f64());
        let mut guard = StopGuard {
            driver: &mut self.driver,
            armed: true,
        };
        guard.driver.set_wheels(duty)?;
        std::thread::sleep(duration);
        guard.release()
    }
}

impl<M: MotorDriver> DriveMotors for WheelDrive<M> {
    fn turn(&mut self, angle_deg: i32) -> Result<()> {
        if angle_deg == 0 {
            return Ok(());
        }
        log::info!("turn {} degrees", angle_deg);
        let (fwd, rev) = (self.config.turn_forward, self.config.turn_reverse);
        let speeds = if angle_deg > 0 {
            [fwd, fwd, rev, rev]
        } else {
            [rev, rev, fwd, fwd]
        };
        let duration = self.turn_duration(angle_deg);
        self.run(speeds, duration)
    }

    fn straight(&mut self, speed: f64, duration: Duration) -> Result<()> {
        if speed == 0.0 {
            return Ok(());
        }
        self.run([speed; 4], duration)
    }

    fn halt(&mut self) -> Result<()> {
        self.driver.set_wheels(WheelDuty::STOP)
    }
}

impl<M: MotorDriver> Drop for WheelDrive<M> {
    fn drop(&mut self) {
        if let Err(err) = self.driver.set_wheels(WheelDuty::STOP) {
            log::error!("failed to stop wheels on drop: {}", err);
        }
    }
}

/// Zeroes the wheels when a motion ends, whether it returns, fails or unwinds.
struct StopGuard<'a, M: MotorDriver> {
    driver: &'a mut M,
    armed: bool,
}

impl<M: MotorDriver> StopGuard<'_, M> {
    fn release(mut self) -> Result<()> {
        self.armed = false;
        self.driver.set_wheels(WheelDuty::STOP)
    }
}

impl<M: MotorDriver> Drop for StopGuard<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.driver.set_wheels(WheelDuty::STOP) {
                log::error!("failed to stop wheels: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<WheelDuty>>>);

    struct FakeMotors {
        log: Log,
        fail_on_move: bool,
    }

    impl MotorDriver for FakeMotors {
        fn set_wheels(&mut self, duty: WheelDuty) -> Result<()> {
            self.log.0.lock().unwrap().push(duty);
            if self.fail_on_move && duty != WheelDuty::STOP {
                return Err(anyhow!("motor fault"));
            }
            Ok(())
        }
    }

    fn quick() -> DriveConfig {
        DriveConfig {
            turn_secs_per_90: 0.0,
            ..DriveConfig::default()
        }
    }

    #[test]
    fn straight_scales_by_gain_and_stops() -> Result<()> {
        let log = Log::default();
        let mut drive = WheelDrive::new(
            FakeMotors {
                log: log.clone(),
                fail_on_move: false,
            },
            quick(),
        );
        drive.straight(-1.0, Duration::ZERO)?;
        let seen = log.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                WheelDuty {
                    left_upper: -400,
                    left_lower: -400,
                    right_upper: -400,
                    right_lower: -400
                },
                WheelDuty::STOP
            ]
        );
        Ok(())
    }

    #[test]
    fn turn_direction_picks_wheel_pattern() -> Result<()> {
        let log = Log::default();
        let mut drive = WheelDrive::new(
            FakeMotors {
                log: log.clone(),
                fail_on_move: false,
            },
            quick(),
        );
        drive.turn(30)?;
        drive.turn(-30)?;
        let seen = log.0.lock().unwrap().clone();
        assert_eq!(seen[0].left_upper, 2000);
        assert_eq!(seen[0].right_lower, -1600);
        assert_eq!(seen[2].left_upper, -1600);
        assert_eq!(seen[2].right_lower, 2000);
        Ok(())
    }

    #[test]
    fn turn_time_is_proportional_to_angle() {
        let drive = WheelDrive::new(
            FakeMotors {
                log: Log::default(),
                fail_on_move: false,
            },
            DriveConfig::default(),
        );
        assert!((drive.turn_duration(90).as_secs_f64() - 0.7).abs() < 1e-6);
        assert!((drive.turn_duration(-45).as_secs_f64() - 0.35).abs() < 1e-6);
    }

    #[test]
    fn failed_motion_still_stops_wheels() {
        let log = Log::default();
        let mut drive = WheelDrive::new(
            FakeMotors {
                log: log.clone(),
                fail_on_move: true,
            },
            quick(),
        );
        assert!(drive.straight(1.0, Duration::ZERO).is_err());
        assert_eq!(log.0.lock().unwrap().last(), Some(&WheelDuty::STOP));
    }

    #[test]
    fn zero_motion_is_a_no_op() -> Result<()> {
        let log = Log::default();
        let mut drive = WheelDrive::new(
            FakeMotors {
                log: log.clone(),
                fail_on_move: false,
            },
            quick(),
        );
        drive.turn(0)?;
        drive.straight(0.0, Duration::from_secs(5))?;
        assert!(log.0.lock().unwrap().is_empty());
        Ok(())
    }
}
