//! follow_light - run the light-following control loop

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use light_follower::{Follower, FollowerConfig, HardwareMode, StopSignal};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON or TOML).
    #[arg(long, env = "FOLLOWER_CONFIG")]
    config: Option<PathBuf>,
    /// Hardware to drive: simulated or real.
    #[arg(long)]
    mode: Option<HardwareMode>,
    /// Stop after this many seconds.
    #[arg(long)]
    max_runtime: Option<f64>,
    /// Loop the images in this directory instead of a synthetic camera (simulated mode).
    #[arg(long)]
    mock_images: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = FollowerConfig::load_from(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(secs) = args.max_runtime {
        config.max_runtime = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
    }
    if let Some(dir) = args.mock_images {
        config.camera.mock_images = Some(dir);
    }
    config.validate()?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.trigger() {
            log::info!("shutdown signal received, stopping follower...");
        }
    })
    .expect("error setting Ctrl-C handler");

    if config.mode == HardwareMode::Real {
        log::warn!(
            "real mode: motor, servo and distance drivers must be attached by the embedding \
             application; this binary has none and will stop at initialisation"
        );
    }
    let hardware = config.hardware();
    let follower = Follower::new(config, hardware);
    let summary = follower.run(stop)?;

    for stage in &summary.stages {
        log::info!(
            "{}: processed={} failed={} discarded={}",
            stage.name,
            stage.processed,
            stage.failed,
            stage.discarded
        );
    }
    if let Some(last) = summary.recent_decisions.last() {
        log::info!(
            "last decision #{:04}: head {:?} motion {:?}",
            last.sequence,
            last.head,
            last.motion
        );
    }
    Ok(())
}
