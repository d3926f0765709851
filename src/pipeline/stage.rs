//! Pipeline stage runner.
//!
//! A stage repeatedly takes the newest item from its input channel, applies its
//! transform and publishes the result downstream. Older items that piled up
//! while the transform was busy are dropped: for a live control loop a stale
//! frame is worse than a missed one.

use std::time::Duration;

use anyhow::Result;

use super::latest::{Latest, LatestReceiver, LatestSender};
use super::stop::StopSignal;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-stage counters returned when the stage exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    /// Items the transform completed successfully.
    pub processed: u64,
    /// Items the transform rejected; the stage carried on.
    pub failed: u64,
    /// Items dropped unprocessed: overwritten upstream, skipped, or drained at shutdown.
    pub discarded: u64,
}

pub struct Stage<I, O> {
    name: String,
    input: LatestReceiver<I>,
    output: Option<LatestSender<O>>,
    stop: StopSignal,
    poll_interval: Duration,
}

impl<I, O> Stage<I, O> {
    pub fn new(
        name: impl Into<String>,
        input: LatestReceiver<I>,
        output: Option<LatestSender<O>>,
        stop: StopSignal,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            stop,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Upper bound on how long the stage waits before re-checking the stop signal.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until the stop signal is set or the upstream sender goes away.
    ///
    /// A transform error only skips that item. After stopping, anything still
    /// queued on the input is drained once and counted as discarded; the last
    /// in-flight item is not guaranteed to be processed.
    pub fn run<F>(self, mut transform: F) -> StageReport
    where
        F: FnMut(I) -> Result<O>,
    {
        let mut report = StageReport {
            name: self.name.clone(),
            ..StageReport::default()
        };
        log::info!("{}: stage started", self.name);

        while !self.stop.is_set() {
            let item = match self.input.recv_latest(self.poll_interval) {
                Latest::Item { item, skipped } => {
                    report.discarded += skipped;
                    item
                }
                Latest::Empty => continue,
                Latest::Closed => {
                    log::info!("{}: upstream closed", self.name);
                    break;
                }
            };
            if self.stop.is_set() {
                report.discarded += 1;
                break;
            }

            let out = match transform(item) {
                Ok(out) => out,
                Err(err) => {
                    report.failed += 1;
                    log::warn!("{}: item skipped: {:#}", self.name, err);
                    continue;
                }
            };
            report.processed += 1;

            let Some(output) = &self.output else {
                continue;
            };
            // Stop enqueuing the moment shutdown is requested.
            if self.stop.is_set() {
                break;
            }
            if let Err(err) = output.send(out) {
                log::warn!("{}: downstream closed: {}", self.name, err);
                break;
            }
        }

        report.discarded += self.input.drain();
        report.discarded += self.input.counts().overwritten;
        log::info!(
            "{}: stage stopped (processed={} failed={} discarded={})",
            self.name,
            report.processed,
            report.failed,
            report.discarded
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::latest::channel;
    use anyhow::anyhow;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn processes_only_newest_item_when_busy() -> Result<()> {
        let (in_tx, in_rx) = channel::<u32>();
        let (out_tx, out_rx) = channel::<u32>();
        let stop = StopSignal::new();
        let (seen_tx, seen_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        let stage = Stage::new("busy", in_rx, Some(out_tx), stop.clone());
        let worker = thread::spawn(move || {
            stage.run(|n| {
                seen_tx.send(n).unwrap();
                // Hold the first item until the producer has flooded the input.
                if n == 0 {
                    gate_rx.recv().unwrap();
                }
                Ok(n * 10)
            })
        });

        in_tx.send(0)?;
        while seen_rx.recv_timeout(Duration::from_millis(500))? != 0 {}
        for n in 1..=50 {
            in_tx.send(n)?;
        }
        gate_tx.send(())?;

        let next = seen_rx.recv_timeout(Duration::from_secs(2))?;
        assert_eq!(next, 50, "stage must skip straight to the newest item");

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Latest::Item { item: 500, .. } = out_rx.recv_latest(DEFAULT_POLL_INTERVAL) {
                break;
            }
            assert!(Instant::now() < deadline, "result of newest item never published");
        }

        stop.trigger();
        let report = worker.join().map_err(|_| anyhow!("stage panicked"))?;
        assert_eq!(report.processed, 2);
        assert_eq!(report.discarded, 49);
        Ok(())
    }

    #[test]
    fn idles_without_input_until_stopped() -> Result<()> {
        let (_in_tx, in_rx) = channel::<u32>();
        let stop = StopSignal::new();
        let stage: Stage<u32, ()> = Stage::new("idle", in_rx, None, stop.clone());
        let worker = thread::spawn(move || stage.run(|_| Ok(())));

        thread::sleep(Duration::from_millis(100));
        assert!(!worker.is_finished());

        let stopped_at = Instant::now();
        stop.trigger();
        let report = worker.join().map_err(|_| anyhow!("stage panicked"))?;
        assert!(stopped_at.elapsed() < DEFAULT_POLL_INTERVAL * 20);
        assert_eq!(report.processed, 0);
        Ok(())
    }

    #[test]
    fn transform_errors_do_not_end_the_stage() -> Result<()> {
        let (in_tx, in_rx) = channel::<u32>();
        let stop = StopSignal::new();
        let (seen_tx, seen_rx) = mpsc::channel();
        let stage: Stage<u32, ()> = Stage::new("flaky", in_rx, None, stop.clone());
        let worker = thread::spawn(move || {
            stage.run(|n| {
                seen_tx.send(n).unwrap();
                if n % 2 == 1 {
                    Err(anyhow!("odd item {}", n))
                } else {
                    Ok(())
                }
            })
        });

        for n in 1..=4 {
            in_tx.send(n)?;
            assert_eq!(seen_rx.recv_timeout(Duration::from_secs(2))?, n);
        }
        stop.trigger();
        let report = worker.join().map_err(|_| anyhow!("stage panicked"))?;
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 2);
        Ok(())
    }

    #[test]
    fn stops_promptly_under_continuous_input() -> Result<()> {
        let (in_tx, in_rx) = channel::<u32>();
        let (out_tx, _out_rx) = channel::<u32>();
        let stop = StopSignal::new();
        let producer_stop = StopSignal::new();
        let (seen_tx, seen_rx) = mpsc::channel();

        let producer = {
            let producer_stop = producer_stop.clone();
            thread::spawn(move || {
                let mut n = 0u32;
                while !producer_stop.is_set() && in_tx.send(n).is_ok() {
                    n = n.wrapping_add(1);
                    thread::sleep(Duration::from_micros(200));
                }
                n
            })
        };

        let stage = Stage::new("flooded", in_rx, Some(out_tx), stop.clone());
        let worker = thread::spawn(move || {
            stage.run(|n| {
                let _ = seen_tx.send(n);
                thread::sleep(Duration::from_millis(2));
                Ok(n)
            })
        });

        // Let the stage chew through several items before stopping it.
        for _ in 0..5 {
            seen_rx.recv_timeout(Duration::from_secs(2))?;
        }
        let stopped_at = Instant::now();
        stop.trigger();
        let report = worker.join().map_err(|_| anyhow!("stage panicked"))?;
        assert!(
            stopped_at.elapsed() < DEFAULT_POLL_INTERVAL * 20,
            "stage took {:?} to stop",
            stopped_at.elapsed()
        );
        assert!(report.processed >= 5);

        producer_stop.trigger();
        let sent = producer.join().map_err(|_| anyhow!("producer panicked"))?;
        assert!(sent as u64 >= report.processed);
        Ok(())
    }

    #[test]
    fn stop_drains_pending_input() -> Result<()> {
        let (in_tx, in_rx) = channel::<u32>();
        let stop = StopSignal::new();
        stop.trigger();
        in_tx.send(7)?;
        let stage: Stage<u32, ()> = Stage::new("late", in_rx, None, stop);
        let report = stage.run(|_| Ok(()));
        assert_eq!(report.processed, 0);
        assert_eq!(report.discarded, 1);
        Ok(())
    }

    #[test]
    fn exits_when_upstream_closes() {
        let (in_tx, in_rx) = channel::<u32>();
        drop(in_tx);
        let stage: Stage<u32, ()> = Stage::new("orphan", in_rx, None, StopSignal::new());
        let report = stage.run(|_| Ok(()));
        assert_eq!(report.processed, 0);
    }
}
