//! Tidings: a broadcast node for message-passing clusters.
//!
//! Values injected at any node spread to every reachable node over a
//! partitioned star topology, with per-neighbor acknowledgment tracking
//! and resends, and an optional batching hub.
pub mod broadcast;
pub mod cli;
pub mod error;
pub mod node;
pub mod runtime;
pub mod settings;
pub mod transport;
