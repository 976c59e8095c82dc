//! Primary election over an unreliable broadcast channel.
//!
//! Every peer runs the same [`ElectionNode`]: it advertises itself with
//! periodic liveness beacons, watches the beacons of the node it believes to
//! be primary, and when that node goes quiet runs a single-round plurality
//! vote in which every initiator proposes the lowest known [`NodeId`].

pub mod clock;
pub mod config;
pub mod election;
pub mod error;
pub mod id;
pub mod message;
pub mod node;
pub mod registry;
pub mod state;

pub use config::{Config, NodeOptions};
pub use election::{Outcome, VoteRound};
pub use error::{Result, SyncerError};
pub use id::{NodeId, VoteId};
pub use message::{LiveMessage, VoteMessage};
pub use node::{live_topic, vote_topic, ElectionNode};
pub use registry::NodeRegistry;
pub use state::{Action, ElectionState, Phase};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Handle identifying one subscription on a transport.
pub type SubscriptionId = u64;

/// A live subscription: payloads published on the topic arrive on `receiver`.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<Bytes>,
}

/// Named-topic broadcast channel the election runs over.
///
/// Delivery is best effort: at most once, unordered across publishers. A
/// publisher's own subscriptions receive its messages too; nodes rely on
/// this to hear their own beacons and ballots.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Bytes) -> anyhow::Result<()>;

    async fn subscribe(&self, topic: &str) -> anyhow::Result<Subscription>;

    async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> anyhow::Result<()>;

    /// Releases the transport. Further calls may fail.
    async fn close(&self) -> anyhow::Result<()>;
}
