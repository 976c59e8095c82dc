use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Epoch-millisecond clock of one node.
///
/// Anchored to the wall clock once and advanced by the tokio clock, so it
/// never runs backwards and follows paused/advanced time in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch_ms: u64,
    anchor: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            epoch_ms,
            anchor: Instant::now(),
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let clock = Clock::new();
        let start = clock.now_millis();
        tokio::time::advance(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now_millis() - start, 1_250);
    }
}
