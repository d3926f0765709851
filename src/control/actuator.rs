use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};

use super::decision::Decision;
use crate::hardware::{DriveMotors, HeadServo};

/// Applies decisions to the head and the body.
///
/// Head and body are independent: a failure on one does not skip the other
/// for the same decision.
pub struct Actuator {
    head: Box<dyn HeadServo>,
    drive: Box<dyn DriveMotors>,
    motion_duration: Duration,
    trace: VecDeque<Decision>,
    trace_capacity: usize,
}

impl Actuator {
    pub fn new(
        head: Box<dyn HeadServo>,
        drive: Box<dyn DriveMotors>,
        motion_duration: Duration,
        trace_capacity: usize,
    ) -> Self {
        Self {
            head,
            drive,
            motion_duration,
            trace: VecDeque::with_capacity(trace_capacity),
            trace_capacity,
        }
    }

    pub fn apply(&mut self, decision: Decision) -> Result<()> {
        let head = if decision.move_head {
            self.head
                .move_to(decision.head)
                .with_context(|| format!("head move for #{:04}", decision.sequence))
        } else {
            Ok(())
        };

        // Turn first, then the straight leg; a failed turn does not skip it.
        let motion = decision.motion;
        let turn = if motion.turn_deg != 0 {
            self.drive
                .turn(motion.turn_deg)
                .with_context(|| format!("turn for #{:04}", decision.sequence))
        } else {
            Ok(())
        };
        let straight = if motion.speed != 0.0 {
            self.drive
                .straight(motion.speed, self.motion_duration)
                .with_context(|| format!("straight for #{:04}", decision.sequence))
        } else {
            Ok(())
        };
        let body = turn.and(straight);

        if self.trace_capacity > 0 {
            if self.trace.len() == self.trace_capacity {
                self.trace.pop_front();
            }
            self.trace.push_back(decision);
        }
        head.and(body)
    }

    /// Stop the wheels and centre the head.
    pub fn park(&mut self) -> Result<()> {
        let halted = self.drive.halt().context("halt drive");
        let centred = self.head.center().context("centre head");
        halted.and(centred)
    }

    /// Most recent decisions applied, oldest first.
    pub fn trace(&self) -> impl Iterator<Item = &Decision> {
        self.trace.iter()
    }

    pub fn into_trace(self) -> Vec<Decision> {
        self.trace.iter().copied().collect()
    }
}
