//! In-memory broadcast transport for running election nodes in one process.

pub mod error;
pub mod mock;
pub mod network;

pub use error::TransportError;
pub use mock::EndpointId;
pub use mock::MockTransport;
pub use mock::TransportRegistry;
pub use network::NetworkOptions;

pub use syncer_core::Transport; // Re-export core trait

use async_trait::async_trait;
use bytes::Bytes;
use syncer_core::{Subscription, SubscriptionId};

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> anyhow::Result<()> {
        Ok(self.publish_impl(topic, payload)?)
    }

    async fn subscribe(&self, topic: &str) -> anyhow::Result<Subscription> {
        Ok(self.subscribe_impl(topic)?)
    }

    async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> anyhow::Result<()> {
        Ok(self.unsubscribe_impl(topic, id)?)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.close_impl();
        Ok(())
    }
}
