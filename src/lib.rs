//! Light Follower
//!
//! Real-time control loop for a small camera robot that follows the brightest
//! object in view while keeping its distance.
//!
//! # Architecture
//!
//! Four stages run concurrently, each in its own thread, linked by
//! always-latest channels that keep only the freshest unconsumed item:
//!
//! 1. **Source**: captures numbered frames from the camera.
//! 2. **Focus**: finds the centroid of the brightest region (`vision`).
//! 3. **Decision**: maps the centroid to angles and runs the bang-bang
//!    follow law against the current distance reading (`control`).
//! 4. **Actuation**: steps the pan/tilt head and drives the body.
//!
//! # Module Structure
//!
//! - `frame`: Frame data model
//! - `vision`: Brightness focus extraction and angle mapping
//! - `pipeline`: Always-latest channels, stop signal, stage runner
//! - `control`: Decision engine and actuator
//! - `hardware`: Capability interface with simulated and real variants
//! - `orchestrator`: Stage wiring, run limits, ordered shutdown
//! - `config`: File and environment configuration

pub mod config;
pub mod control;
pub mod frame;
pub mod hardware;
pub mod orchestrator;
pub mod pipeline;
pub mod vision;

pub use config::{FollowerConfig, HardwareMode, VisionSettings};
pub use control::{
    Actuator, Decision, DecisionConfig, DecisionEngine, HeadBounds, HeadPosition, MotionCommand,
};
pub use frame::{Frame, PixelLayout};
pub use hardware::{HardwareFactory, RealHardware, SimulatedHardware};
pub use orchestrator::{Follower, RunSummary, StopReason};
pub use pipeline::{StageReport, StopSignal};
pub use vision::{AngleMapper, AngleOffset, BrightnessFocus, FocusPoint};
