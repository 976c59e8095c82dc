use crate::error::TransportError;
use crate::network::NetworkOptions;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use syncer_core::{Subscription, SubscriptionId};
use tokio::sync::mpsc;

/// Identifies one transport endpoint (typically one node) in a registry.
pub type EndpointId = u64;

/// One subscriber of a topic.
#[derive(Debug, Clone)]
struct Subscriber {
    endpoint: EndpointId,
    tx: mpsc::UnboundedSender<Bytes>,
}

/// A shared topic table for MockTransport instances within a test context.
///
/// Plays the role of the broadcast medium: every endpoint registered here
/// can publish to, and subscribe on, any topic.
#[derive(Debug, Default)]
pub struct TransportRegistry {
    topics: RwLock<HashMap<String, HashMap<SubscriptionId, Subscriber>>>,
    endpoints: RwLock<HashSet<EndpointId>>,
    next_subscription: AtomicU64,
}

impl TransportRegistry {
    /// Creates a new, empty transport registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .expect("Registry lock poisoned")
            .get(topic)
            .map_or(0, HashMap::len)
    }

    fn register(&self, endpoint: EndpointId) -> Result<(), TransportError> {
        let mut guard = self.endpoints.write().expect("Registry lock poisoned");
        if !guard.insert(endpoint) {
            return Err(TransportError::EndpointAlreadyExists(endpoint));
        }
        tracing::trace!(endpoint, "Registered transport endpoint");
        Ok(())
    }

    /// Removes `endpoint` and every subscription it holds.
    fn unregister(&self, endpoint: EndpointId) {
        let mut topics = self.topics.write().expect("Registry lock poisoned");
        for subscribers in topics.values_mut() {
            subscribers.retain(|_, s| s.endpoint != endpoint);
        }
        topics.retain(|_, subscribers| !subscribers.is_empty());
        drop(topics);

        if self.endpoints.write().expect("Registry lock poisoned").remove(&endpoint) {
            tracing::trace!(endpoint, "Unregistered transport endpoint");
        }
    }

    fn subscribe(&self, topic: &str, endpoint: EndpointId) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.topics
            .write()
            .expect("Registry lock poisoned")
            .entry(topic.to_string())
            .or_default()
            .insert(id, Subscriber { endpoint, tx });
        tracing::trace!(endpoint, topic, subscription = id, "Subscribed");
        Subscription { id, receiver }
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write().expect("Registry lock poisoned");
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&id).is_some();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Snapshot of the subscribers of `topic`.
    fn subscribers(&self, topic: &str) -> Vec<Subscriber> {
        self.topics
            .read()
            .expect("Registry lock poisoned")
            .get(topic)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// State of one endpoint, shared by all clones of its `MockTransport`.
#[derive(Debug)]
struct Endpoint {
    id: EndpointId,
    network_options: RwLock<NetworkOptions>,
    registry: Arc<TransportRegistry>,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
    closed: AtomicBool,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// An in-memory broadcast transport built on Tokio unbounded channels.
///
/// This transport simulates network conditions like delay, loss, and partitions.
/// It requires a shared `TransportRegistry` to reach other endpoints. Clones
/// share the same endpoint; it is unregistered when the last clone drops.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Endpoint>,
}

impl MockTransport {
    /// Creates a MockTransport with a perfect network.
    pub fn create(endpoint: EndpointId, registry: Arc<TransportRegistry>) -> Result<Self, TransportError> {
        Self::create_with_options(endpoint, NetworkOptions::default(), registry)
    }

    /// Creates a new MockTransport with specific network simulation options
    /// and registers it with the provided registry.
    pub fn create_with_options(
        endpoint: EndpointId,
        options: NetworkOptions,
        registry: Arc<TransportRegistry>,
    ) -> Result<Self, TransportError> {
        registry.register(endpoint)?;

        let transport = MockTransport {
            inner: Arc::new(Endpoint {
                id: endpoint,
                network_options: RwLock::new(options),
                registry,
                subscriptions: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        };

        tracing::debug!(endpoint, "MockTransport created and registered");
        Ok(transport)
    }

    pub fn endpoint(&self) -> EndpointId {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Updates the network simulation options for this transport.
    pub fn update_network_options(&self, options: NetworkOptions) {
        let mut current_options = self.inner.network_options.write().expect("Options lock poisoned");
        *current_options = options;
        tracing::debug!(
            endpoint = self.inner.id,
            ?current_options,
            "Updated network options"
        );
    }

    /// Partitions this endpoint from the specified peer (one-way).
    pub fn partition_from(&self, peer: EndpointId) {
        let mut options = self.inner.network_options.write().expect("Options lock poisoned");
        options.partitioned_links.insert((self.inner.id, peer));
        tracing::info!(from = self.inner.id, to = peer, "Network partition created");
    }

    /// Removes a previously created partition from this endpoint to the specified peer.
    pub fn heal_partition_from(&self, peer: EndpointId) {
        let mut options = self.inner.network_options.write().expect("Options lock poisoned");
        if options.partitioned_links.remove(&(self.inner.id, peer)) {
            tracing::info!(from = self.inner.id, to = peer, "Network partition healed");
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.inner.id));
        }
        Ok(())
    }

    pub(crate) fn publish_impl(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;

        let options = self
            .inner
            .network_options
            .read()
            .expect("Options lock poisoned")
            .clone();
        let from = self.inner.id;

        for subscriber in self.inner.registry.subscribers(topic) {
            if subscriber.endpoint == from {
                let _ = subscriber.tx.send(payload.clone());
                continue;
            }

            if options.is_partitioned(from, subscriber.endpoint) {
                tracing::trace!(from, to = subscriber.endpoint, topic, "Delivery blocked by partition");
                continue;
            }

            if options.should_drop_message() {
                tracing::trace!(from, to = subscriber.endpoint, topic, "Delivery dropped due to simulated loss");
                continue;
            }

            match options.sample_delay() {
                None => {
                    if subscriber.tx.send(payload.clone()).is_err() {
                        tracing::trace!(from, to = subscriber.endpoint, topic, "Subscriber gone");
                    }
                }
                Some(delay) => {
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = subscriber.tx.send(payload);
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn subscribe_impl(&self, topic: &str) -> Result<Subscription, TransportError> {
        self.ensure_open()?;
        let subscription = self.inner.registry.subscribe(topic, self.inner.id);
        self.inner
            .subscriptions
            .lock()
            .expect("Subscriptions lock poisoned")
            .push((topic.to_string(), subscription.id));
        Ok(subscription)
    }

    pub(crate) fn unsubscribe_impl(&self, topic: &str, id: SubscriptionId) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut owned = self.inner.subscriptions.lock().expect("Subscriptions lock poisoned");
        let Some(position) = owned.iter().position(|(t, s)| t == topic && *s == id) else {
            return Err(TransportError::SubscriptionNotFound(topic.to_string(), id));
        };
        owned.swap_remove(position);
        drop(owned);

        self.inner.registry.unsubscribe(topic, id);
        tracing::trace!(endpoint = self.inner.id, topic, subscription = id, "Unsubscribed");
        Ok(())
    }

    /// Marks the endpoint closed and drops all of its subscriptions.
    /// Closing twice is a no-op.
    pub(crate) fn close_impl(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let owned = std::mem::take(&mut *self.inner.subscriptions.lock().expect("Subscriptions lock poisoned"));
        for (topic, id) in owned {
            self.inner.registry.unsubscribe(&topic, id);
        }
        tracing::debug!(endpoint = self.inner.id, "MockTransport closed");
    }
}
