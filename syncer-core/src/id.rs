//! Node and vote-round identifiers.
//!
//! Both are random floats. A [`NodeId`] doubles as the election ranking key:
//! the numerically smallest known id is every initiator's candidate.

use crate::error::{Result, SyncerError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Identity of one election node.
///
/// Always finite, so it is totally ordered and hashable. No collision
/// detection is performed between peers.
#[derive(Debug, Clone, Copy)]
pub struct NodeId(f64);

impl NodeId {
    /// Wraps `value`, rejecting NaN and infinities.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(SyncerError::InvalidNodeId(value.to_string()));
        }
        // -0.0 and 0.0 must hash and compare identically.
        Ok(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Draws a fresh identifier uniformly from `[0, 1)`.
    pub fn random() -> Self {
        Self(rand::random::<f64>())
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NodeId {}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = SyncerError;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| SyncerError::InvalidNodeId(s.to_string()))?;
        Self::new(value)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

/// Peers may send ids either as numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let parsed = match RawId::deserialize(deserializer)? {
            RawId::Number(value) => NodeId::new(value),
            RawId::Text(text) => text.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// Identifier of one election round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(f64);

impl VoteId {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn random() -> Self {
        Self(rand::random::<f64>())
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
