use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use light_follower::config::{FollowerConfig, HardwareMode};
use light_follower::vision::{Connectivity, Weighting};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FOLLOWER_CONFIG",
        "FOLLOWER_MODE",
        "FOLLOWER_MAX_RUNTIME_SECS",
        "FOLLOWER_MOCK_IMAGES",
        "FOLLOWER_MIN_DISTANCE_M",
        "FOLLOWER_DEAD_ZONE_DEG",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FollowerConfig::load().expect("load defaults");
    assert_eq!(cfg.mode, HardwareMode::Simulated);
    assert_eq!(cfg.max_runtime, Duration::from_secs(30));
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.fps, 10);
    assert_eq!(cfg.control.dead_zone_deg, 3.0);
    assert_eq!(cfg.control.min_distance_m, 0.20);
    assert_eq!(cfg.control.bounds.h_max, 70);
    assert_eq!(cfg.control.bounds.v_min, -20);
    assert_eq!(cfg.vision.blur_index, 15.0);
    assert_eq!(cfg.motion_duration, Duration::from_millis(500));
    assert_eq!(cfg.trace_capacity, 128);
    assert!(!cfg.control.recenter_head_on_turn);
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
        mode = "real"
        max_runtime_secs = 12.5

        [camera]
        device = "/dev/video2"
        width = 640
        height = 480
        fov_x_deg = 70.0
        warmup_ms = 0

        [vision]
        blur_index = 20.0
        weighting = "uniform"
        connectivity = "eight"

        [control]
        target_v_deg = 10
        motion_duration_ms = 250
        recenter_head_on_turn = true

        [control.head_bounds]
        v_max = 45

        [neck]
        step_deg = 3
        "#,
    );

    std::env::set_var("FOLLOWER_CONFIG", file.path());
    std::env::set_var("FOLLOWER_MODE", "simulated");
    std::env::set_var("FOLLOWER_DEAD_ZONE_DEG", "5");
    std::env::set_var("FOLLOWER_MIN_DISTANCE_M", "0.35");

    let cfg = FollowerConfig::load().expect("load config");

    assert_eq!(cfg.mode, HardwareMode::Simulated);
    assert_eq!(cfg.max_runtime, Duration::from_millis(12_500));
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.fov_x_deg, 70.0);
    assert_eq!(cfg.camera.fov_y_deg, 48.8);
    assert_eq!(cfg.camera.warmup, Duration::ZERO);
    assert_eq!(cfg.vision.weighting, Weighting::Uniform);
    assert_eq!(cfg.vision.connectivity, Connectivity::Eight);
    assert_eq!(cfg.control.target_v_deg, 10);
    assert_eq!(cfg.control.dead_zone_deg, 5.0);
    assert_eq!(cfg.control.min_distance_m, 0.35);
    assert!(cfg.control.recenter_head_on_turn);
    assert_eq!(cfg.control.bounds.v_max, 45);
    assert_eq!(cfg.neck.bounds.v_max, 45);
    assert_eq!(cfg.neck.step_deg, 3);
    assert_eq!(cfg.motion_duration, Duration::from_millis(250));

    clear_env();
}

#[test]
fn loads_json_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let file = write_config(
        ".json",
        &format!(
            r#"{{
                "max_runtime_secs": 3,
                "camera": {{ "mock_images": "{}" }},
                "sim": {{ "distance_m": 0.1 }}
            }}"#,
            dir.path().display()
        ),
    );

    let cfg = FollowerConfig::load_from(Some(file.path())).expect("load json config");
    assert_eq!(cfg.max_runtime, Duration::from_secs(3));
    assert_eq!(cfg.camera.mock_images.as_deref(), Some(dir.path()));
    assert_eq!(cfg.sim.distance_m, 0.1);
}

#[test]
fn mock_images_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FOLLOWER_MOCK_IMAGES", "/tmp/light-frames");
    std::env::set_var("FOLLOWER_MAX_RUNTIME_SECS", "2");
    let cfg = FollowerConfig::load().expect("load config");
    assert_eq!(
        cfg.camera.mock_images.as_deref(),
        Some(std::path::Path::new("/tmp/light-frames"))
    );
    assert_eq!(cfg.max_runtime, Duration::from_secs(2));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FOLLOWER_MODE", "hovercraft");
    assert!(FollowerConfig::load().is_err());
    clear_env();

    std::env::set_var("FOLLOWER_MAX_RUNTIME_SECS", "soon");
    let err = FollowerConfig::load().unwrap_err();
    assert!(err.to_string().contains("FOLLOWER_MAX_RUNTIME_SECS"));
    clear_env();

    std::env::set_var("FOLLOWER_MAX_RUNTIME_SECS", "0");
    assert!(FollowerConfig::load().is_err());
    clear_env();

    std::env::set_var("FOLLOWER_DEAD_ZONE_DEG", "-1");
    assert!(FollowerConfig::load().is_err());
    clear_env();

    let file = write_config(".toml", "[camera]\nfov_y_deg = 0.0\n");
    std::env::set_var("FOLLOWER_CONFIG", file.path());
    let err = FollowerConfig::load().unwrap_err();
    assert!(err.to_string().contains("field of view"));
    clear_env();

    let file = write_config(".toml", "[vision]\nblur_index = 0.0\n");
    assert!(FollowerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(".json", "{ not json");
    let err = FollowerConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    let missing = std::path::Path::new("/nonexistent/follower.toml");
    let err = FollowerConfig::load_from(Some(missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
