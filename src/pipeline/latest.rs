//! Always-latest channel.
//!
//! A single-producer, single-consumer channel holding at most one item. Sending
//! into a full channel replaces the unconsumed item, so the consumer always
//! receives the freshest value and never a backlog. Neither endpoint is
//! `Clone`: exclusive consumption is what makes the overwrite safe.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

#[derive(Debug, Default)]
struct ChannelStats {
    sent: AtomicU64,
    overwritten: AtomicU64,
    receiver_alive: AtomicBool,
}

/// Counters shared by both endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelCounts {
    pub sent: u64,
    /// Items replaced by a newer send before the consumer took them.
    pub overwritten: u64,
}

/// Producing end; each send replaces whatever the consumer has not taken.
pub struct LatestSender<T> {
    tx: Sender<T>,
    // Lets the producer evict the stale item when the slot is full.
    evict: Receiver<T>,
    stats: Arc<ChannelStats>,
}

/// Consuming end; always yields the newest item sent.
pub struct LatestReceiver<T> {
    rx: Receiver<T>,
    stats: Arc<ChannelStats>,
}

/// Outcome of one bounded wait on the receiver.
#[derive(Debug, PartialEq, Eq)]
pub enum Latest<T> {
    /// The newest available item and how many older ones were dropped to get it.
    Item { item: T, skipped: u64 },
    /// Nothing arrived within the wait.
    Empty,
    /// The sender is gone and the channel is drained.
    Closed,
}

/// Create a connected always-latest sender and receiver pair.
pub fn channel<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let stats = Arc::new(ChannelStats {
        receiver_alive: AtomicBool::new(true),
        ..ChannelStats::default()
    });
    (
        LatestSender {
            tx,
            evict: rx.clone(),
            stats: stats.clone(),
        },
        LatestReceiver { rx, stats },
    )
}

impl<T> LatestSender<T> {
    /// Publish `item`, replacing any item the consumer has not taken yet.
    /// Never blocks. Fails only when the receiver has been dropped.
    pub fn send(&self, item: T) -> Result<()> {
        if !self.stats.receiver_alive.load(Ordering::SeqCst) {
            return Err(anyhow!("latest channel receiver dropped"));
        }
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(TrySendError::Full(back)) => {
                    // The consumer may win the race for the stale item; either way
                    // the slot frees up and the retry succeeds.
                    if self.evict.try_recv().is_ok() {
                        self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
                    }
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(anyhow!("latest channel disconnected"));
                }
            }
        }
    }

    pub fn counts(&self) -> ChannelCounts {
        counts(&self.stats)
    }
}

impl<T> LatestReceiver<T> {
    /// Wait up to `timeout` for an item, then keep only the newest one available.
    pub fn recv_latest(&self, timeout: Duration) -> Latest<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut item = first;
                let mut skipped = 0;
                // The slot holds one item, but a send may land between the wait
                // and here; loop until nothing newer remains.
                while let Ok(next) = self.rx.try_recv() {
                    item = next;
                    skipped += 1;
                }
                Latest::Item { item, skipped }
            }
            Err(RecvTimeoutError::Timeout) => Latest::Empty,
            Err(RecvTimeoutError::Disconnected) => Latest::Closed,
        }
    }

    /// Discard whatever is pending without blocking. Returns the number dropped.
    pub fn drain(&self) -> u64 {
        self.rx.try_iter().count() as u64
    }

    pub fn counts(&self) -> ChannelCounts {
        counts(&self.stats)
    }
}

impl<T> Drop for LatestReceiver<T> {
    fn drop(&mut self) {
        self.stats.receiver_alive.store(false, Ordering::SeqCst);
    }
}

fn counts(stats: &ChannelStats) -> ChannelCounts {
    ChannelCounts {
        sent: stats.sent.load(Ordering::Relaxed),
        overwritten: stats.overwritten.load(Ordering::Relaxed),
    }
}
