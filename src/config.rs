use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::control::{DecisionConfig, HeadBounds};
use crate::hardware::{
    CameraConfig, DriveConfig, HardwareFactory, NeckConfig, RealHardware, SimConfig,
    SimulatedHardware,
};
use crate::pipeline::DEFAULT_POLL_INTERVAL;
use crate::vision::{Connectivity, Weighting, DEFAULT_BLUR_INDEX};

const DEFAULT_MAX_RUNTIME_SECS: f64 = 30.0;
const DEFAULT_MOTION_DURATION_MS: u64 = 500;
const DEFAULT_TRACE_CAPACITY: usize = 128;

#[derive(Debug, Deserialize, Default)]
struct FollowerConfigFile {
    mode: Option<HardwareMode>,
    max_runtime_secs: Option<f64>,
    poll_interval_ms: Option<u64>,
    trace_capacity: Option<usize>,
    camera: Option<CameraConfigFile>,
    vision: Option<VisionConfigFile>,
    control: Option<ControlConfigFile>,
    neck: Option<NeckConfigFile>,
    drive: Option<DriveConfigFile>,
    sim: Option<SimConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    fov_x_deg: Option<f64>,
    fov_y_deg: Option<f64>,
    warmup_ms: Option<u64>,
    mock_images: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    blur_index: Option<f64>,
    weighting: Option<Weighting>,
    connectivity: Option<Connectivity>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    dead_zone_deg: Option<f64>,
    target_v_deg: Option<i32>,
    min_distance_m: Option<f64>,
    drive_speed: Option<f64>,
    motion_duration_ms: Option<u64>,
    recenter_head_on_turn: Option<bool>,
    head_bounds: Option<HeadBoundsFile>,
}

#[derive(Debug, Deserialize, Default)]
struct HeadBoundsFile {
    h_min: Option<i32>,
    h_max: Option<i32>,
    v_min: Option<i32>,
    v_max: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct NeckConfigFile {
    offset_h_deg: Option<f64>,
    offset_v_deg: Option<f64>,
    step_deg: Option<i32>,
    step_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DriveConfigFile {
    gain: Option<f64>,
    turn_secs_per_90: Option<f64>,
    turn_forward: Option<f64>,
    turn_reverse: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SimConfigFile {
    distance_m: Option<f64>,
}

/// Which hardware factory the follower runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
    #[default]
    Simulated,
    Real,
}

impl FromStr for HardwareMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Self::Simulated),
            "real" => Ok(Self::Real),
            other => Err(anyhow!(
                "unknown hardware mode '{}' (expected simulated or real)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionSettings {
    pub blur_index: f64,
    pub weighting: Weighting,
    pub connectivity: Connectivity,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            blur_index: DEFAULT_BLUR_INDEX,
            weighting: Weighting::default(),
            connectivity: Connectivity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FollowerConfig {
    pub mode: HardwareMode,
    /// Wall-clock limit for one run.
    pub max_runtime: Duration,
    /// How long a stage waits for input before re-checking the stop signal.
    pub poll_interval: Duration,
    /// Number of recent decisions kept for the run summary.
    pub trace_capacity: usize,
    pub camera: CameraConfig,
    pub vision: VisionSettings,
    pub control: DecisionConfig,
    /// How long each straight-line motion lasts.
    pub motion_duration: Duration,
    pub neck: NeckConfig,
    pub drive: DriveConfig,
    pub sim: SimConfig,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            mode: HardwareMode::default(),
            max_runtime: Duration::from_secs_f64(DEFAULT_MAX_RUNTIME_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            camera: CameraConfig::default(),
            vision: VisionSettings::default(),
            control: DecisionConfig::default(),
            motion_duration: Duration::from_millis(DEFAULT_MOTION_DURATION_MS),
            neck: NeckConfig::default(),
            drive: DriveConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl FollowerConfig {
    /// Load from the file named by `FOLLOWER_CONFIG` (if any) plus environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FOLLOWER_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, but with an explicit config file instead of `FOLLOWER_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FollowerConfigFile) -> Self {
        let defaults = Self::default();

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            fps: camera_file.fps.unwrap_or(defaults.camera.fps),
            fov_x_deg: camera_file.fov_x_deg.unwrap_or(defaults.camera.fov_x_deg),
            fov_y_deg: camera_file.fov_y_deg.unwrap_or(defaults.camera.fov_y_deg),
            warmup: camera_file
                .warmup_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.camera.warmup),
            mock_images: camera_file.mock_images,
        };

        let vision_file = file.vision.unwrap_or_default();
        let vision = VisionSettings {
            blur_index: vision_file.blur_index.unwrap_or(defaults.vision.blur_index),
            weighting: vision_file.weighting.unwrap_or(defaults.vision.weighting),
            connectivity: vision_file
                .connectivity
                .unwrap_or(defaults.vision.connectivity),
        };

        let control_file = file.control.unwrap_or_default();
        let bounds_file = control_file.head_bounds.unwrap_or_default();
        let default_bounds = defaults.control.bounds;
        let bounds = HeadBounds {
            h_min: bounds_file.h_min.unwrap_or(default_bounds.h_min),
            h_max: bounds_file.h_max.unwrap_or(default_bounds.h_max),
            v_min: bounds_file.v_min.unwrap_or(default_bounds.v_min),
            v_max: bounds_file.v_max.unwrap_or(default_bounds.v_max),
        };
        let control = DecisionConfig {
            dead_zone_deg: control_file
                .dead_zone_deg
                .unwrap_or(defaults.control.dead_zone_deg),
            target_v_deg: control_file
                .target_v_deg
                .unwrap_or(defaults.control.target_v_deg),
            min_distance_m: control_file
                .min_distance_m
                .unwrap_or(defaults.control.min_distance_m),
            drive_speed: control_file
                .drive_speed
                .unwrap_or(defaults.control.drive_speed),
            bounds,
            recenter_head_on_turn: control_file
                .recenter_head_on_turn
                .unwrap_or(defaults.control.recenter_head_on_turn),
        };
        let motion_duration = control_file
            .motion_duration_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.motion_duration);

        let neck_file = file.neck.unwrap_or_default();
        let neck = NeckConfig {
            offset_h_deg: neck_file.offset_h_deg.unwrap_or(defaults.neck.offset_h_deg),
            offset_v_deg: neck_file.offset_v_deg.unwrap_or(defaults.neck.offset_v_deg),
            step_deg: neck_file.step_deg.unwrap_or(defaults.neck.step_deg),
            step_interval: neck_file
                .step_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.neck.step_interval),
            bounds,
        };

        let drive_file = file.drive.unwrap_or_default();
        let drive = DriveConfig {
            gain: drive_file.gain.unwrap_or(defaults.drive.gain),
            turn_secs_per_90: drive_file
                .turn_secs_per_90
                .unwrap_or(defaults.drive.turn_secs_per_90),
            turn_forward: drive_file.turn_forward.unwrap_or(defaults.drive.turn_forward),
            turn_reverse: drive_file.turn_reverse.unwrap_or(defaults.drive.turn_reverse),
        };

        let sim = SimConfig {
            distance_m: file
                .sim
                .and_then(|sim| sim.distance_m)
                .unwrap_or(defaults.sim.distance_m),
        };

        Self {
            mode: file.mode.unwrap_or(defaults.mode),
            max_runtime: file
                .max_runtime_secs
                .map(secs_to_duration)
                .unwrap_or(defaults.max_runtime),
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            trace_capacity: file.trace_capacity.unwrap_or(defaults.trace_capacity),
            camera,
            vision,
            control,
            motion_duration,
            neck,
            drive,
            sim,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("FOLLOWER_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse()?;
            }
        }
        if let Ok(secs) = std::env::var("FOLLOWER_MAX_RUNTIME_SECS") {
            let secs: f64 = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_MAX_RUNTIME_SECS must be a number of seconds"))?;
            self.max_runtime = secs_to_duration(secs);
        }
        if let Ok(dir) = std::env::var("FOLLOWER_MOCK_IMAGES") {
            if !dir.trim().is_empty() {
                self.camera.mock_images = Some(PathBuf::from(dir));
            }
        }
        if let Ok(distance) = std::env::var("FOLLOWER_MIN_DISTANCE_M") {
            self.control.min_distance_m = distance
                .trim()
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_MIN_DISTANCE_M must be a distance in meters"))?;
        }
        if let Ok(dead_zone) = std::env::var("FOLLOWER_DEAD_ZONE_DEG") {
            self.control.dead_zone_deg = dead_zone
                .trim()
                .parse()
                .map_err(|_| anyhow!("FOLLOWER_DEAD_ZONE_DEG must be an angle in degrees"))?;
        }
        Ok(())
    }

    /// Check cross-field constraints. Called by `load`; call it again after
    /// applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if !(camera.fov_x_deg > 0.0 && camera.fov_y_deg > 0.0) {
            return Err(anyhow!("camera field of view must be positive"));
        }
        if !(self.vision.blur_index > 0.0) {
            return Err(anyhow!("blur_index must be greater than zero"));
        }

        let control = &self.control;
        let bounds = control.bounds;
        if !(bounds.h_min <= 0 && 0 <= bounds.h_max && bounds.v_min <= 0 && 0 <= bounds.v_max) {
            return Err(anyhow!(
                "head bounds h [{}, {}] v [{}, {}] must contain the centre position",
                bounds.h_min,
                bounds.h_max,
                bounds.v_min,
                bounds.v_max
            ));
        }
        if !(control.dead_zone_deg >= 0.0) {
            return Err(anyhow!("dead zone must not be negative"));
        }
        if !(control.min_distance_m >= 0.0) {
            return Err(anyhow!("minimum distance must not be negative"));
        }
        if !(control.drive_speed >= 0.0) {
            return Err(anyhow!("drive speed must not be negative"));
        }
        if self.neck.step_deg <= 0 {
            return Err(anyhow!("head step must be greater than zero"));
        }
        if !(self.drive.turn_secs_per_90 >= 0.0) {
            return Err(anyhow!("turn time must not be negative"));
        }
        if !(self.sim.distance_m >= 0.0) {
            return Err(anyhow!("simulated distance must not be negative"));
        }
        if self.max_runtime.is_zero() {
            return Err(anyhow!("max runtime must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        Ok(())
    }

    /// Build the hardware factory for `mode`.
    ///
    /// `Real` hardware comes up without motor, servo or range-finder drivers;
    /// an embedding application attaches them to its own `RealHardware`.
    pub fn hardware(&self) -> Arc<dyn HardwareFactory> {
        match self.mode {
            HardwareMode::Simulated => Arc::new(SimulatedHardware::new(
                self.camera.clone(),
                self.neck,
                self.drive,
                self.sim,
            )),
            HardwareMode::Real => Arc::new(RealHardware::new(
                self.camera.clone(),
                self.neck,
                self.drive,
            )),
        }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    // Negative and NaN collapse to zero and are rejected by `validate`.
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

fn read_config_file(path: &Path) -> Result<FollowerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
