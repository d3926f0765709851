//! Control: the follow decision law and the actuation consumer.

mod actuator;
mod decision;

pub use actuator::Actuator;
pub use decision::{
    Decision, DecisionConfig, DecisionEngine, HeadBounds, HeadPosition, MotionCommand,
};
