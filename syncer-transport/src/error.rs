use crate::mock::EndpointId;
use syncer_core::SubscriptionId;
use thiserror::Error;

/// Errors that can occur during mock transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Endpoint {0} is closed")]
    Closed(EndpointId),

    #[error("Endpoint {0} is already registered in the transport")]
    EndpointAlreadyExists(EndpointId),

    #[error("Subscription {1} on topic '{0}' not found")]
    SubscriptionNotFound(String, SubscriptionId),
}
