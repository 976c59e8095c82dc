use thiserror::Error;

/// Errors surfaced by the node lifecycle and the wire codec.
///
/// The election protocol itself never fails: malformed traffic is dropped
/// and logged, split votes simply defer.
#[derive(Error, Debug)]
pub enum SyncerError {
    #[error("Node is already initialized")]
    AlreadyInitialized,

    #[error("Node has not been initialized")]
    NotInitialized,

    #[error("Invalid node identifier: {0}")]
    InvalidNodeId(String),

    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),

    #[error("Node driver failed: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, SyncerError>;
