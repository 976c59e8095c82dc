use crate::mock::EndpointId;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Options to configure simulated network behavior for `MockTransport`.
///
/// Only deliveries to other endpoints are affected; a publisher always
/// receives its own messages immediately.
#[derive(Clone, Debug)]
pub struct NetworkOptions {
    /// Probability (0.0 to 1.0) of dropping a delivery.
    pub message_loss_probability: f64,
    /// Minimum delay to add to a delivery.
    pub min_delay: Duration,
    /// Maximum delay to add to a delivery (uniform random between min and max).
    pub max_delay: Duration,
    /// Set of pairs (A, B) indicating that endpoint A cannot reach endpoint B.
    /// Note: This simulates one-way partitions. For a full partition, add both (A, B) and (B, A).
    pub partitioned_links: HashSet<(EndpointId, EndpointId)>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            message_loss_probability: 0.0,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            partitioned_links: HashSet::new(),
        }
    }
}

impl NetworkOptions {
    /// Uniform random delay in `[min, max]`.
    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn with_loss(mut self, probability: f64) -> Self {
        self.message_loss_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Checks if a delivery should be dropped due to loss probability.
    pub fn should_drop_message(&self) -> bool {
        self.message_loss_probability > 0.0 && rand::random::<f64>() < self.message_loss_probability
    }

    /// Checks if the link from `sender` to `receiver` is partitioned.
    pub fn is_partitioned(&self, sender: EndpointId, receiver: EndpointId) -> bool {
        self.partitioned_links.contains(&(sender, receiver))
    }

    /// Picks the delay for one delivery, if any is configured.
    pub fn sample_delay(&self) -> Option<Duration> {
        let delay = if self.min_delay == Duration::ZERO && self.max_delay == Duration::ZERO {
            None
        } else if self.min_delay == self.max_delay {
            Some(self.min_delay)
        } else if self.min_delay > self.max_delay {
            tracing::warn!(min = ?self.min_delay, max = ?self.max_delay, "min_delay > max_delay, using min_delay");
            Some(self.min_delay)
        } else {
            Some(rand::rng().random_range(self.min_delay..=self.max_delay))
        };

        delay.filter(|d| *d > Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delay_by_default() {
        assert_eq!(NetworkOptions::default().sample_delay(), None);
    }

    #[test]
    fn fixed_and_inverted_delays_use_min() {
        let fixed = NetworkOptions::default().with_delay(Duration::from_millis(5), Duration::from_millis(5));
        assert_eq!(fixed.sample_delay(), Some(Duration::from_millis(5)));

        let inverted = NetworkOptions::default().with_delay(Duration::from_millis(9), Duration::from_millis(3));
        assert_eq!(inverted.sample_delay(), Some(Duration::from_millis(9)));
    }

    #[test]
    fn random_delay_stays_in_range() {
        let options = NetworkOptions::default().with_delay(Duration::from_millis(2), Duration::from_millis(8));
        for _ in 0..100 {
            let delay = options.sample_delay().unwrap();
            assert!(delay >= Duration::from_millis(2) && delay <= Duration::from_millis(8));
        }
    }

    #[test]
    fn loss_extremes() {
        let never = NetworkOptions::default();
        let always = NetworkOptions::default().with_loss(1.5);
        assert_eq!(always.message_loss_probability, 1.0);
        for _ in 0..100 {
            assert!(!never.should_drop_message());
            assert!(always.should_drop_message());
        }
    }

    #[test]
    fn partitions_are_one_way() {
        let mut options = NetworkOptions::default();
        options.partitioned_links.insert((1, 2));
        assert!(options.is_partitioned(1, 2));
        assert!(!options.is_partitioned(2, 1));
    }
}
