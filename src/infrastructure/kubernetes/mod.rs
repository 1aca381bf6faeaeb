//! Kubernetes API access with pluggable transport

pub mod client;
pub mod gvks;
pub mod tunnel;

pub use client::{
    gvk_of, ClientOptions, EdgeKubeClient, EdgeKubeClientImpl, EventSource, ObjectEvent,
    WatchStream,
};
pub use tunnel::{SshSpec, SshTunnel};

use backon::ExponentialBuilder;
use std::time::Duration;

/// Backoff for writes that lost an optimistic concurrency race:
/// exponential delays capped at one minute, retried until the write
/// lands.
pub fn conflict_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_max_delay(Duration::from_secs(60))
        .without_max_times()
}
