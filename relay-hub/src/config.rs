//! Hub configuration.
//!
//! This module provides configuration for the relay hub including:
//! - Transport buffer sizes
//! - Admission ceiling
//! - Keepalive cadence and deadlines
//! - Queue capacities

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relay hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// WebSocket read buffer size in bytes.
    ///
    /// Accepted for configuration compatibility; the WebSocket transport
    /// sizes its read buffer internally and exposes no knob for it.
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,

    /// WebSocket write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum number of registered sessions (admission ceiling)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Keepalive ping cadence in seconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Read deadline in seconds (no inbound frame within this window closes
    /// the session)
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Write deadline in seconds for each outbound frame or ping
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Per-session outbox capacity in envelopes
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Shared dispatch queue capacity in envelopes
    #[serde(default = "default_queue_capacity")]
    pub dispatch_queue_capacity: usize,

    /// Number of dispatcher worker tasks
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            max_connections: default_max_connections(),
            ping_interval_secs: default_ping_interval(),
            pong_wait_secs: default_pong_wait(),
            write_timeout_secs: default_write_timeout(),
            outbox_capacity: default_outbox_capacity(),
            dispatch_queue_capacity: default_queue_capacity(),
            dispatch_workers: default_dispatch_workers(),
        }
    }
}

impl HubConfig {
    /// Returns the keepalive cadence as a Duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Returns the read deadline as a Duration.
    #[must_use]
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Returns the write deadline as a Duration.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_connections() -> usize {
    10_000
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_wait() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    10
}

fn default_outbox_capacity() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_dispatch_workers() -> usize {
    1
}
