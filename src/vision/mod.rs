//! Vision: brightness focus extraction and pixel-to-angle mapping.
//!
//! Both are pure functions of their inputs; the focus stage and the decision
//! stage call them once per item.

mod angle;
mod focus;
mod labels;

pub use angle::{normalize_degrees, AngleMapper, AngleOffset};
pub use focus::{BrightAreas, BrightnessFocus, FocusPoint, Weighting, DEFAULT_BLUR_INDEX};
pub use labels::{label_components, ComponentLabels, Connectivity};
