//! CLI for this application
//!
use crate::node::NodeName;
use crate::settings;

pub use settings::{APP_NAME, APP_VERSION};

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = APP_NAME, version = APP_VERSION)]
pub struct Cli {
    // Topology: nodes per star group
    #[clap(
        long,
        default_value = settings::DEFAULT_GROUP_SIZE,
        env("TIDINGS_GROUP_SIZE"),
        help = "Number of nodes in each star group of the topology"
    )]
    pub group_size: usize,

    // Batching hub
    #[clap(
        long,
        default_value = settings::STANDARD_HUB,
        env("TIDINGS_HUB"),
        help = "Node id that batches new values instead of relaying them"
    )]
    pub hub: String,

    #[clap(
        long,
        env("TIDINGS_DISABLE_HUB"),
        help = "Run without a batching hub; every node relays directly"
    )]
    pub disable_hub: bool,

    // Hub flush delay
    #[clap(
        long,
        default_value = settings::DEFAULT_BATCH_DELAY_MS,
        env("TIDINGS_BATCH_DELAY_MS"),
        help = "Milliseconds the hub accumulates values before flushing a batch"
    )]
    pub batch_delay_ms: u64,

    // Retry policy
    #[clap(
        long,
        default_value = settings::DEFAULT_RETRY_INTERVAL_MS,
        env("TIDINGS_RETRY_INTERVAL_MS"),
        help = "Minimum age in milliseconds before an unacknowledged relay is resent"
    )]
    pub retry_interval_ms: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_RETRY_SWEEP_MS,
        env("TIDINGS_RETRY_SWEEP_MS"),
        help = "Period in milliseconds of the background retry sweep (0 disables)"
    )]
    pub retry_sweep_ms: u64,

    #[clap(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env("TIDINGS_LINK_GROUP_HUBS"),
        help = "Connect the local hubs of all groups so the topology stays connected"
    )]
    pub link_group_hubs: bool,

    #[clap(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env("TIDINGS_RELAY_BATCHES"),
        help = "Relay newly seen batch values to neighbors other than the hub"
    )]
    pub relay_batches: bool,

    #[clap(
        long,
        default_value = settings::DEFAULT_OUTBOUND_BUFFER,
        env("TIDINGS_OUTBOUND_BUFFER"),
        help = "Capacity of the outbound envelope queue"
    )]
    pub outbound_buffer: usize,

    #[clap(long, env("TIDINGS_LOG_JSON"), help = "Write logs to stderr as JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            group_size: self.group_size,
            hub: NodeName::from(self.hub),
            disable_hub: self.disable_hub,
            batch_delay_ms: self.batch_delay_ms,
            retry_interval_ms: self.retry_interval_ms,
            retry_sweep_ms: self.retry_sweep_ms,
            link_group_hubs: self.link_group_hubs,
            relay_batches: self.relay_batches,
            outbound_buffer: self.outbound_buffer,
            log_json: self.log_json,
        }
    }
}
