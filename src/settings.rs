//! Tidings node settings
use std::time::Duration;

use crate::config_error;
use crate::error::Result;
use crate::node::NodeName;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_GROUP_SIZE: usize = 25;
pub const DEFAULT_GROUP_SIZE: &str = "25";
pub const STANDARD_HUB: &str = "n0";
pub const STANDARD_BATCH_DELAY_MS: u64 = 500;
pub const DEFAULT_BATCH_DELAY_MS: &str = "500";
pub const STANDARD_RETRY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RETRY_INTERVAL_MS: &str = "1000";
pub const DEFAULT_RETRY_SWEEP_MS: &str = "1000";
pub const STANDARD_OUTBOUND_BUFFER: usize = 1000;
pub const DEFAULT_OUTBOUND_BUFFER: &str = "1000";

/// Knobs of the dissemination protocol
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastSettings {
    // Size of each star group in the partitioned topology
    pub group_size: usize,
    // Node that batches instead of relaying (None disables batching)
    pub hub: Option<NodeName>,
    // How long the hub accumulates values before a flush
    pub batch_delay: Duration,
    // Minimum age of an unacknowledged relay before it is resent
    pub retry_interval: Duration,
    // Period of the background retry sweep (None disables it)
    pub retry_sweep: Option<Duration>,
    // Connect the local hubs of all groups to each other
    pub link_group_hubs: bool,
    // Forward newly seen batch values to non-hub neighbors
    pub relay_batches: bool,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            group_size: STANDARD_GROUP_SIZE,
            hub: Some(NodeName::from(STANDARD_HUB)),
            batch_delay: Duration::from_millis(STANDARD_BATCH_DELAY_MS),
            retry_interval: Duration::from_millis(STANDARD_RETRY_INTERVAL_MS),
            retry_sweep: Some(Duration::from_millis(STANDARD_RETRY_INTERVAL_MS)),
            link_group_hubs: true,
            relay_batches: true,
        }
    }
}

impl BroadcastSettings {
    pub fn is_hub(&self, node: &NodeName) -> bool {
        self.hub.as_ref() == Some(node)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Topology group size
    pub group_size: usize,

    // Statically designated batching hub
    pub hub: NodeName,
    pub disable_hub: bool,

    // Timing, in milliseconds
    pub batch_delay_ms: u64,
    pub retry_interval_ms: u64,
    pub retry_sweep_ms: u64, // 0 disables the background sweep

    // Open-question switches
    pub link_group_hubs: bool,
    pub relay_batches: bool,

    // Capacity of the outbound envelope channel
    pub outbound_buffer: usize,

    // Emit logs as JSON
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group_size: STANDARD_GROUP_SIZE,
            hub: NodeName::from(STANDARD_HUB),
            disable_hub: false,
            batch_delay_ms: STANDARD_BATCH_DELAY_MS,
            retry_interval_ms: STANDARD_RETRY_INTERVAL_MS,
            retry_sweep_ms: STANDARD_RETRY_INTERVAL_MS,
            link_group_hubs: true,
            relay_batches: true,
            outbound_buffer: STANDARD_OUTBOUND_BUFFER,
            log_json: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(config_error!("group size must be at least 1"));
        }
        if self.outbound_buffer == 0 {
            return Err(config_error!("outbound buffer must be at least 1"));
        }
        Ok(())
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            group_size: self.group_size,
            hub: if self.disable_hub {
                None
            } else {
                Some(self.hub.clone())
            },
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            retry_sweep: (self.retry_sweep_ms > 0)
                .then(|| Duration::from_millis(self.retry_sweep_ms)),
            link_group_hubs: self.link_group_hubs,
            relay_batches: self.relay_batches,
        }
    }
}
