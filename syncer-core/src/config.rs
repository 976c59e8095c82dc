//! Node configuration.
//!
//! Everything derives from a single heartbeat period: the failure-check
//! period is twice that, and a peer is considered dead after five periods
//! without a beacon.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Heartbeat period used when the supplied one is out of range.
pub const DEFAULT_LIVE_INTERVAL_MS: u64 = 250;

/// Largest heartbeat period accepted as-is.
pub const MAX_LIVE_INTERVAL_MS: u64 = 100;

pub const LIVE_INTERVAL_ENV: &str = "SYNCER_LIVE_INTERVAL_MS";
pub const DEBUG_ENV: &str = "SYNCER_DEBUG";

/// Caller-facing overrides, as accepted by `ElectionNode::create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeOptions {
    /// Heartbeat period in milliseconds. Any JSON value is accepted; ones
    /// that are not a positive number decode as 0 and are later replaced
    /// by the default.
    #[serde(rename = "liveInterval", deserialize_with = "lenient_interval")]
    pub live_interval_ms: u64,
    /// Log the registry on every heartbeat at info level.
    pub debug: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            live_interval_ms: DEFAULT_LIVE_INTERVAL_MS,
            debug: false,
        }
    }
}

impl NodeOptions {
    /// Reads `SYNCER_LIVE_INTERVAL_MS` and `SYNCER_DEBUG`, falling back to
    /// the defaults for anything missing or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(raw) = lookup(LIVE_INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => options.live_interval_ms = ms,
                Err(e) => {
                    tracing::warn!(var = LIVE_INTERVAL_ENV, value = %raw, error = %e, "Ignoring unparseable live interval")
                }
            }
        }

        if let Some(raw) = lookup(DEBUG_ENV) {
            options.debug = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        options
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let ms = match RawInterval::deserialize(deserializer)? {
        RawInterval::Number(ms) => ms,
        RawInterval::Text(text) => text.trim().parse().unwrap_or(0.0),
        RawInterval::Other(_) => 0.0,
    };
    if ms.is_finite() && ms > 0.0 {
        Ok(ms.round() as u64)
    } else {
        Ok(0)
    }
}

/// Validated, immutable timing configuration of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    live_interval_ms: u64,
    vote_interval_ms: u64,
    dead_interval_ms: u64,
    debug: bool,
}

impl Config {
    /// Builds a configuration from a heartbeat period.
    ///
    /// Periods outside `(0, MAX_LIVE_INTERVAL_MS]` are replaced by
    /// [`DEFAULT_LIVE_INTERVAL_MS`]; the substitution is logged.
    pub fn new(live_interval_ms: u64) -> Self {
        let live = if live_interval_ms > 0 && live_interval_ms <= MAX_LIVE_INTERVAL_MS {
            live_interval_ms
        } else {
            if live_interval_ms != DEFAULT_LIVE_INTERVAL_MS {
                tracing::warn!(
                    requested_ms = live_interval_ms,
                    substituted_ms = DEFAULT_LIVE_INTERVAL_MS,
                    max_ms = MAX_LIVE_INTERVAL_MS,
                    "Live interval out of range, using default"
                );
            }
            DEFAULT_LIVE_INTERVAL_MS
        };

        Self {
            live_interval_ms: live,
            vote_interval_ms: live * 2,
            dead_interval_ms: live * 5,
            debug: false,
        }
    }

    pub fn from_options(options: &NodeOptions) -> Self {
        Self {
            debug: options.debug,
            ..Self::new(options.live_interval_ms)
        }
    }

    pub fn live_interval_ms(&self) -> u64 {
        self.live_interval_ms
    }

    pub fn vote_interval_ms(&self) -> u64 {
        self.vote_interval_ms
    }

    pub fn dead_interval_ms(&self) -> u64 {
        self.dead_interval_ms
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn live_interval(&self) -> Duration {
        Duration::from_millis(self.live_interval_ms)
    }

    pub fn vote_interval(&self) -> Duration {
        Duration::from_millis(self.vote_interval_ms)
    }

    pub fn dead_interval(&self) -> Duration {
        Duration::from_millis(self.dead_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_options(&NodeOptions::default())
    }
}
