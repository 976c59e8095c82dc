use crate::error::Result;
use crate::id::{NodeId, VoteId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Liveness beacon broadcast on every heartbeat tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Sender
    pub id: NodeId,
    /// Sender's clock, epoch milliseconds
    #[serde(alias = "ts")]
    pub timestamp: u64,
    /// Whether the sender believes itself to be primary
    pub primary: bool,
}

/// A ballot: `id` votes for `vote` in round `vote_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteMessage {
    #[serde(rename = "voteID")]
    pub vote_id: VoteId,
    pub id: NodeId,
    pub vote: NodeId,
}

impl LiveMessage {
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl VoteMessage {
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
