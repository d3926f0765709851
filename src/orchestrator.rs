//! Follower orchestration.
//!
//! Wires the four stages of the follow loop together:
//!
//! ```text
//! source --frames--> focus --points--> decision --decisions--> actuation
//! ```
//!
//! Every edge is an always-latest channel and every stage runs in its own
//! named thread. Stages start consumer first (actuation, decision, focus,
//! source) and are joined in reverse. One `StopSignal` is shared by all of
//! them: the orchestrator sets it on timeout, the caller sets it on
//! interrupt, and a stage sets it when its hardware cannot be opened.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::config::FollowerConfig;
use crate::control::{Actuator, Decision, DecisionEngine};
use crate::frame::Frame;
use crate::hardware::HardwareFactory;
use crate::pipeline::{channel, LatestSender, Stage, StageReport, StopSignal};
use crate::vision::{AngleMapper, BrightnessFocus, FocusPoint};

/// Pause after a failed capture before trying again.
const CAPTURE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The configured maximum runtime elapsed.
    MaxRuntime,
    /// The stop signal was set from outside.
    Interrupted,
    /// A stage ended on its own.
    StageFailure,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub runtime: Duration,
    pub frames_captured: u64,
    /// In pipeline order: source, focus, decision, actuation.
    pub stages: Vec<StageReport>,
    /// Most recent decisions applied by the actuation stage, oldest first.
    pub recent_decisions: Vec<Decision>,
}

impl RunSummary {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.name == name)
    }
}

#[derive(Debug, Default)]
struct StageOutcome {
    report: StageReport,
    trace: Vec<Decision>,
}

struct RunningStage {
    name: &'static str,
    join: JoinHandle<Result<StageOutcome>>,
}

pub struct Follower {
    config: FollowerConfig,
    hardware: Arc<dyn HardwareFactory>,
}

impl Follower {
    pub fn new(config: FollowerConfig, hardware: Arc<dyn HardwareFactory>) -> Self {
        Self { config, hardware }
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// Run the follow loop until `stop` is set or the maximum runtime elapses.
    ///
    /// Returns once every stage has been joined. If any stage failed, the
    /// first failure is returned as the error.
    pub fn run(&self, stop: StopSignal) -> Result<RunSummary> {
        let started = Instant::now();
        log::info!(
            "follower: starting on {} hardware (max runtime {:.1}s)",
            self.hardware.name(),
            self.config.max_runtime.as_secs_f64()
        );

        let mut stages = Vec::with_capacity(4);
        if let Err(err) = self.spawn_stages(&stop, &mut stages) {
            stop.trigger();
            join_all(stages);
            return Err(err);
        }

        let reason = self.wait(&stop, started, &stages);
        stop.trigger();

        // Reverse of start order: producers first.
        let mut outcomes = Vec::with_capacity(stages.len());
        let mut failure: Option<anyhow::Error> = None;
        for (name, result) in join_all(stages) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    log::error!("follower: {} stage failed: {:#}", name, err);
                    outcomes.push(StageOutcome {
                        report: StageReport {
                            name: name.to_string(),
                            ..StageReport::default()
                        },
                        trace: Vec::new(),
                    });
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            return Err(err.context("follower stopped after a stage failure"));
        }
        let frames_captured = outcomes
            .iter()
            .find(|outcome| outcome.report.name == "source")
            .map_or(0, |outcome| outcome.report.processed);
        let mut recent_decisions = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if !outcome.trace.is_empty() {
                recent_decisions = outcome.trace;
            }
            reports.push(outcome.report);
        }

        let summary = RunSummary {
            stop_reason: reason.unwrap_or(StopReason::StageFailure),
            runtime: started.elapsed(),
            frames_captured,
            stages: reports,
            recent_decisions,
        };
        log::info!(
            "follower: stopped ({:?}) after {:.2}s, {} frames captured",
            summary.stop_reason,
            summary.runtime.as_secs_f64(),
            summary.frames_captured
        );
        Ok(summary)
    }

    fn spawn_stages(&self, stop: &StopSignal, stages: &mut Vec<RunningStage>) -> Result<()> {
        let (frame_tx, frame_rx) = channel::<Frame>();
        let (focus_tx, focus_rx) = channel::<FocusPoint>();
        let (decision_tx, decision_rx) = channel::<Decision>();
        let poll = self.config.poll_interval;

        let hardware = self.hardware.clone();
        let stage_stop = stop.clone();
        let motion_duration = self.config.motion_duration;
        let trace_capacity = self.config.trace_capacity;
        stages.push(spawn_stage("actuation", move || {
            let head = open_or_stop(&stage_stop, "head", || hardware.open_head())?;
            let drive = open_or_stop(&stage_stop, "drive", || hardware.open_drive())?;
            let mut actuator = Actuator::new(head, drive, motion_duration, trace_capacity);
            let report = Stage::new("actuation", decision_rx, None::<LatestSender<()>>, stage_stop)
                .with_poll_interval(poll)
                .run(|decision: Decision| {
                    log::debug!(
                        "actuate #{:04}: head {:?} (move={}) motion {:?}",
                        decision.sequence,
                        decision.head,
                        decision.move_head,
                        decision.motion
                    );
                    actuator.apply(decision)
                });
            if let Err(err) = actuator.park() {
                log::error!("actuation: failed to park hardware: {:#}", err);
            }
            Ok(StageOutcome {
                report,
                trace: actuator.into_trace(),
            })
        })?);

        let hardware = self.hardware.clone();
        let stage_stop = stop.clone();
        let control = self.config.control;
        let mapper = AngleMapper::new(self.config.camera.fov_x_deg, self.config.camera.fov_y_deg);
        stages.push(spawn_stage("decision", move || {
            let mut sensor = open_or_stop(&stage_stop, "distance sensor", || {
                hardware.open_distance_sensor()
            })?;
            let mut engine = DecisionEngine::new(control);
            let report = Stage::new("decision", focus_rx, Some(decision_tx), stage_stop)
                .with_poll_interval(poll)
                .run(|focus: FocusPoint| {
                    let offset = mapper.offset(&focus);
                    let distance_m = sensor.read().context("read distance")?;
                    let decision = engine.decide(focus, offset, distance_m);
                    log::debug!(
                        "decide #{:04}: offset ({:+.1}, {:+.1}) at {:.2} m -> {:?}",
                        decision.sequence,
                        offset.x_deg,
                        offset.y_deg,
                        distance_m,
                        decision.motion
                    );
                    Ok(decision)
                });
            Ok(StageOutcome {
                report,
                trace: Vec::new(),
            })
        })?);

        let stage_stop = stop.clone();
        let vision = self.config.vision.clone();
        stages.push(spawn_stage("focus", move || {
            let extractor =
                BrightnessFocus::new(vision.blur_index, vision.weighting, vision.connectivity);
            let report = Stage::new("focus", frame_rx, Some(focus_tx), stage_stop)
                .with_poll_interval(poll)
                .run(|frame: Frame| {
                    let point = extractor.locate(&frame)?;
                    log::debug!(
                        "focus #{:04} at ({:.1}, {:.1})",
                        point.sequence,
                        point.x,
                        point.y
                    );
                    Ok(point)
                });
            Ok(StageOutcome {
                report,
                trace: Vec::new(),
            })
        })?);

        let hardware = self.hardware.clone();
        let stage_stop = stop.clone();
        stages.push(spawn_stage("source", move || {
            let report = run_source(hardware.as_ref(), frame_tx, &stage_stop, poll)?;
            Ok(StageOutcome {
                report,
                trace: Vec::new(),
            })
        })?);
        Ok(())
    }

    /// Block until the run should end. `None` means a stage ended by itself.
    fn wait(
        &self,
        stop: &StopSignal,
        started: Instant,
        stages: &[RunningStage],
    ) -> Option<StopReason> {
        loop {
            if stop.is_set() {
                log::info!("follower: stop requested");
                return Some(StopReason::Interrupted);
            }
            if started.elapsed() >= self.config.max_runtime {
                log::info!("follower: max runtime reached");
                return Some(StopReason::MaxRuntime);
            }
            if let Some(stage) = stages.iter().find(|stage| stage.join.is_finished()) {
                log::warn!("follower: {} stage ended early", stage.name);
                return None;
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

fn spawn_stage<F>(name: &'static str, body: F) -> Result<RunningStage>
where
    F: FnOnce() -> Result<StageOutcome> + Send + 'static,
{
    let join = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("spawn {} stage", name))?;
    Ok(RunningStage { name, join })
}

fn join_all(mut stages: Vec<RunningStage>) -> Vec<(&'static str, Result<StageOutcome>)> {
    let mut results = Vec::with_capacity(stages.len());
    while let Some(stage) = stages.pop() {
        let result = stage
            .join
            .join()
            .map_err(|_| anyhow!("{} stage thread panicked", stage.name))
            .and_then(|result| result);
        results.push((stage.name, result));
    }
    results
}

/// Open a collaborator for a stage; failure stops every stage.
fn open_or_stop<T>(stop: &StopSignal, what: &str, open: impl FnOnce() -> Result<T>) -> Result<T> {
    open().map_err(|err| {
        stop.trigger();
        err.context(format!("open {}", what))
    })
}

/// Frame source loop: capture, number and publish until stopped.
fn run_source(
    hardware: &dyn HardwareFactory,
    frames: LatestSender<Frame>,
    stop: &StopSignal,
    poll: Duration,
) -> Result<StageReport> {
    let mut report = StageReport {
        name: "source".to_string(),
        ..StageReport::default()
    };
    let mut camera = open_or_stop(stop, "camera", || hardware.open_camera())?;
    log::info!("source: stage started ({} camera)", camera.name());

    let mut sequence = 0u64;
    let mut exhausted = false;
    while !stop.is_set() {
        if exhausted {
            std::thread::sleep(poll);
            continue;
        }
        let image = match camera.capture() {
            Ok(Some(image)) => image,
            Ok(None) => {
                log::info!("source: end of stream after {} frames", sequence);
                exhausted = true;
                continue;
            }
            Err(err) => {
                report.failed += 1;
                log::warn!("source: capture failed: {:#}", err);
                std::thread::sleep(CAPTURE_BACKOFF);
                continue;
            }
        };

        let frame = Frame::from_image(sequence, image);
        sequence += 1;
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                report.failed += 1;
                log::warn!("source: frame skipped: {:#}", err);
                continue;
            }
        };
        if stop.is_set() {
            report.discarded += 1;
            break;
        }
        log::debug!("capture #{:04}", frame.sequence);
        if let Err(err) = frames.send(frame) {
            log::warn!("source: downstream closed: {}", err);
            break;
        }
        report.processed += 1;
    }

    log::info!(
        "source: stage stopped (captured={} failed={} discarded={})",
        report.processed,
        report.failed,
        report.discarded
    );
    Ok(report)
}
