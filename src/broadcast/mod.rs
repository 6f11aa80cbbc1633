//! Value dissemination
//!
//! A value injected at any node reaches every node it has a path to:
//! each node keeps the values it has seen ([`MessageStore`]), relays new
//! ones over a bounded fan-out topology ([`TopologyBuilder`]), and resends
//! relays a neighbor has not acknowledged ([`RetryTracker`]). One
//! designated hub batches what it sees instead ([`HubBatcher`]).
//! [`Disseminator`] wires them together.
pub mod batcher;
pub mod engine;
pub mod retry;
pub mod store;
pub mod topology;

pub use batcher::HubBatcher;
pub use engine::Disseminator;
pub use retry::{Millis, PendingDelivery, RelayContext, RetryTracker};
pub use store::MessageStore;
pub use topology::{Topology, TopologyBuilder};
