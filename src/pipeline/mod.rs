//! Stage plumbing: always-latest channels, the shared stop signal and the
//! generic stage runner every processing step is an instance of.

pub mod latest;
mod stage;
mod stop;

pub use latest::{channel, ChannelCounts, Latest, LatestReceiver, LatestSender};
pub use stage::{Stage, StageReport, DEFAULT_POLL_INTERVAL};
pub use stop::StopSignal;
