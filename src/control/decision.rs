//! Bang-bang follow controller.
//!
//! Each cycle turns an angle offset and a distance reading into a head target
//! and one body motion. Corrections are fixed-magnitude and only issued when
//! the error reaches the dead zone.

use crate::vision::{AngleOffset, FocusPoint};

/// Inclusive head angle limits in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadBounds {
    pub h_min: i32,
    pub h_max: i32,
    pub v_min: i32,
    pub v_max: i32,
}

impl Default for HeadBounds {
    fn default() -> Self {
        Self {
            h_min: -70,
            h_max: 70,
            v_min: -20,
            v_max: 70,
        }
    }
}

impl HeadBounds {
    pub fn clamp(&self, position: HeadPosition) -> HeadPosition {
        HeadPosition {
            h_deg: position.h_deg.clamp(self.h_min, self.h_max),
            v_deg: position.v_deg.clamp(self.v_min, self.v_max),
        }
    }
}

/// Pan (h) and tilt (v) of the head in degrees; (0, 0) looks straight ahead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadPosition {
    pub h_deg: i32,
    pub v_deg: i32,
}

/// Body motion for one cycle. Zero turn and zero speed means stay put.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionCommand {
    pub turn_deg: i32,
    pub speed: f64,
}

impl MotionCommand {
    pub const ON_TARGET: MotionCommand = MotionCommand {
        turn_deg: 0,
        speed: 0.0,
    };

    pub fn turn(turn_deg: i32) -> Self {
        Self {
            turn_deg,
            speed: 0.0,
        }
    }

    pub fn straight(speed: f64) -> Self {
        Self { turn_deg: 0, speed }
    }

    pub fn is_idle(&self) -> bool {
        self.turn_deg == 0 && self.speed == 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionConfig {
    /// Errors below this magnitude (degrees) are treated as zero.
    pub dead_zone_deg: f64,
    /// Head tilt at which the target is at following distance.
    pub target_v_deg: i32,
    /// Closer than this (meters) always backs away.
    pub min_distance_m: f64,
    /// Magnitude of straight-line motion commands.
    pub drive_speed: f64,
    pub bounds: HeadBounds,
    /// Pan the head back by the body turn so the head drifts toward centre.
    /// Off by default: the head follows the offset regardless of the turn.
    pub recenter_head_on_turn: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            dead_zone_deg: 3.0,
            target_v_deg: 0,
            min_distance_m: 0.20,
            drive_speed: 1.0,
            bounds: HeadBounds::default(),
            recenter_head_on_turn: false,
        }
    }
}

/// Everything decided for one focus point, as handed to the actuation stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub sequence: u64,
    pub focus: FocusPoint,
    pub offset: AngleOffset,
    pub distance_m: f64,
    /// Head target after this cycle.
    pub head: HeadPosition,
    /// Whether the head has to move to reach `head`.
    pub move_head: bool,
    pub motion: MotionCommand,
}

/// Closed-loop state: the head position persists across cycles.
#[derive(Clone, Debug)]
pub struct DecisionEngine {
    config: DecisionConfig,
    head: HeadPosition,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            head: HeadPosition::default(),
        }
    }

    pub fn head(&self) -> HeadPosition {
        self.head
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Run one control cycle for `offset` and the current `distance_m`.
    pub fn decide(&mut self, focus: FocusPoint, offset: AngleOffset, distance_m: f64) -> Decision {
        let cfg = self.config;
        let dx = self.dead_zone(offset.x_deg);
        let dy = self.dead_zone(offset.y_deg);

        let predicted = cfg.bounds.clamp(HeadPosition {
            h_deg: self.head.h_deg + dx,
            v_deg: self.head.v_deg + dy,
        });

        let v_error = predicted.v_deg - cfg.target_v_deg;
        let motion = if exceeds(predicted.h_deg, cfg.dead_zone_deg) {
            MotionCommand::turn(predicted.h_deg)
        } else if distance_m < cfg.min_distance_m {
            MotionCommand::straight(-cfg.drive_speed)
        } else if exceeds(v_error, cfg.dead_zone_deg) {
            MotionCommand::straight(cfg.drive_speed.copysign(v_error as f64))
        } else {
            MotionCommand::ON_TARGET
        };

        let mut target = predicted;
        if cfg.recenter_head_on_turn && motion.turn_deg != 0 {
            target = cfg.bounds.clamp(HeadPosition {
                h_deg: predicted.h_deg - motion.turn_deg,
                v_deg: predicted.v_deg,
            });
        }
        let move_head = target != self.head;
        if move_head {
            log::debug!(
                "head {:?} -> {:?} (offset {:+}, {:+})",
                self.head,
                target,
                dx,
                dy
            );
        }
        self.head = target;

        Decision {
            sequence: focus.sequence,
            focus,
            offset,
            distance_m,
            head: target,
            move_head,
            motion,
        }
    }

    fn dead_zone(&self, angle: f64) -> i32 {
        if angle.abs() < self.config.dead_zone_deg {
            0
        } else {
            angle.round() as i32
        }
    }
}

fn exceeds(error: i32, dead_zone: f64) -> bool {
    (error.abs() as f64) >= dead_zone
}

#[cfg(test)]
mod tests {
    use super::*;

    fn focus() -> FocusPoint {
        FocusPoint {
            sequence: 4,
            x: 400.0,
            y: 300.0,
            frame_width: 800,
            frame_height: 600,
        }
    }

    fn offset(x_deg: f64, y_deg: f64) -> AngleOffset {
        AngleOffset { x_deg, y_deg }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default())
    }

    #[test]
    fn no_new_information_means_on_target() {
        let mut engine = engine();
        for _ in 0..3 {
            let decision = engine.decide(focus(), offset(0.0, 0.0), 1.0);
            assert_eq!(decision.motion, MotionCommand::ON_TARGET);
            assert!(!decision.move_head);
            assert_eq!(decision.sequence, 4);
        }
    }

    #[test]
    fn obstacle_forces_reverse_below_dead_zone() {
        let mut engine = engine();
        let decision = engine.decide(focus(), offset(2.0, 2.0), 0.10);
        assert_eq!(decision.motion, MotionCommand { turn_deg: 0, speed: -1.0 });
        assert!(!decision.move_head);
    }

    #[test]
    fn obstacle_overrides_vertical_pursuit() {
        let mut engine = engine();
        let decision = engine.decide(focus(), offset(0.0, 12.0), 0.05);
        assert_eq!(decision.motion, MotionCommand::straight(-1.0));
        assert_eq!(decision.head, HeadPosition { h_deg: 0, v_deg: 12 });
        assert!(decision.move_head);
    }

    #[test]
    fn heading_takes_precedence_over_distance() {
        let mut engine = engine();
        let decision = engine.decide(focus(), offset(-10.4, 0.0), 0.05);
        assert_eq!(decision.motion, MotionCommand::turn(-10));
        assert_eq!(decision.head, HeadPosition { h_deg: -10, v_deg: 0 });
        assert!(decision.move_head);
    }

    #[test]
    fn head_follows_offset_while_turning() {
        let mut engine = engine();
        let decision = engine.decide(focus(), offset(8.0, 0.0), 1.0);
        assert_eq!(decision.motion, MotionCommand::turn(8));
        assert_eq!(decision.head, HeadPosition { h_deg: 8, v_deg: 0 });
        assert!(decision.move_head);
    }

    #[test]
    fn recentring_pans_head_back_by_the_turn() {
        let mut engine = DecisionEngine::new(DecisionConfig {
            recenter_head_on_turn: true,
            ..DecisionConfig::default()
        });
        let decision = engine.decide(focus(), offset(-10.4, 0.0), 1.0);
        assert_eq!(decision.motion, MotionCommand::turn(-10));
        assert_eq!(decision.head, HeadPosition::default());
        assert!(!decision.move_head);
    }

    #[test]
    fn vertical_error_drives_toward_target() {
        let mut engine = engine();
        let up = engine.decide(focus(), offset(0.0, 6.0), 1.0);
        assert_eq!(up.motion, MotionCommand::straight(1.0));

        let mut engine = self::engine();
        let down = engine.decide(focus(), offset(0.0, -6.0), 1.0);
        assert_eq!(down.motion, MotionCommand::straight(-1.0));
    }

    #[test]
    fn head_state_accumulates_and_clamps() {
        let mut engine = DecisionEngine::new(DecisionConfig {
            dead_zone_deg: 100.0,
            ..DecisionConfig::default()
        });
        // Dead zone swallows everything: nothing moves.
        let decision = engine.decide(focus(), offset(50.0, 50.0), 1.0);
        assert_eq!(decision.head, HeadPosition::default());

        let mut engine = DecisionEngine::new(DecisionConfig {
            recenter_head_on_turn: false,
            ..DecisionConfig::default()
        });
        engine.decide(focus(), offset(0.0, 40.0), 1.0);
        engine.decide(focus(), offset(0.0, 40.0), 1.0);
        assert_eq!(engine.head(), HeadPosition { h_deg: 0, v_deg: 70 });
        engine.decide(focus(), offset(0.0, -179.0), 1.0);
        assert_eq!(engine.head(), HeadPosition { h_deg: 0, v_deg: -20 });
    }
}
