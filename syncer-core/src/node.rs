//! The async election node.
//!
//! [`ElectionNode`] owns the lifecycle (subscribe, spawn, tear down). All
//! protocol state lives in an [`ElectionState`] owned by a single driver task
//! that serializes heartbeat ticks, failure-check ticks and inbound messages,
//! so the state needs no locking.

use crate::clock::Clock;
use crate::config::{Config, NodeOptions};
use crate::error::{Result, SyncerError};
use crate::id::NodeId;
use crate::message::{LiveMessage, VoteMessage};
use crate::state::{Action, ElectionState};
use crate::{Subscription, SubscriptionId, Transport};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Callback fired on a role transition of this node.
pub type RoleCallback = Box<dyn FnMut(NodeId) + Send + 'static>;

/// Topic carrying liveness beacons for the node group `name`.
pub fn live_topic(name: &str) -> String {
    format!("syncer-live-chan-{name}")
}

/// Topic carrying ballots for the node group `name`.
pub fn vote_topic(name: &str) -> String {
    format!("syncer-vote-chan-{name}")
}

/// One participant in the election for a named group.
///
/// Nodes with different names never see each other's traffic, even on a
/// shared transport.
pub struct ElectionNode<T: Transport> {
    name: String,
    config: Config,
    transport: Arc<T>,
    pinned_id: Option<NodeId>,
    running: Option<Running>,
}

/// Resources of an initialized node.
struct Running {
    id: NodeId,
    live_topic: String,
    live_subscription: SubscriptionId,
    vote_topic: String,
    vote_subscription: SubscriptionId,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    primary: watch::Receiver<Option<NodeId>>,
}

impl<T: Transport> ElectionNode<T> {
    /// Creates an inert node; nothing runs until [`ElectionNode::init`].
    pub fn create(name: impl Into<String>, options: Option<NodeOptions>, transport: T) -> Self {
        let config = Config::from_options(&options.unwrap_or_default());
        Self {
            name: name.into(),
            config,
            transport: Arc::new(transport),
            pinned_id: None,
            running: None,
        }
    }

    /// Uses `id` instead of a random identity at `init`.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.pinned_id = Some(id);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identity, once initialized.
    pub fn id(&self) -> Option<NodeId> {
        self.running.as_ref().map(|r| r.id)
    }

    /// Current belief about who is primary.
    pub fn primary(&self) -> Option<NodeId> {
        self.running.as_ref().and_then(|r| *r.primary.borrow())
    }

    /// Receiver that observes every change of the primary belief.
    pub fn watch_primary(&self) -> Result<watch::Receiver<Option<NodeId>>> {
        self.running
            .as_ref()
            .map(|r| r.primary.clone())
            .ok_or(SyncerError::NotInitialized)
    }

    /// Assigns the identity, subscribes to both topics and starts the timers.
    ///
    /// `on_primary` fires with this node's id when it becomes primary;
    /// `on_replica` fires with the new primary's id when it steps down. Both
    /// run on the node's driver task.
    pub async fn init<P, R>(&mut self, on_primary: P, on_replica: R) -> Result<NodeId>
    where
        P: FnMut(NodeId) + Send + 'static,
        R: FnMut(NodeId) + Send + 'static,
    {
        if self.running.is_some() {
            return Err(SyncerError::AlreadyInitialized);
        }

        let id = self.pinned_id.unwrap_or_else(NodeId::random);
        let live_topic = live_topic(&self.name);
        let vote_topic = vote_topic(&self.name);

        let Subscription {
            id: live_subscription,
            receiver: live_rx,
        } = self.transport.subscribe(&live_topic).await?;
        let Subscription {
            id: vote_subscription,
            receiver: vote_rx,
        } = match self.transport.subscribe(&vote_topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                if let Err(undo) = self.transport.unsubscribe(&live_topic, live_subscription).await {
                    tracing::warn!(node_id = %id, error = %undo, "Failed to roll back live subscription");
                }
                return Err(e.into());
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (primary_tx, primary_rx) = watch::channel(None);

        let driver = Driver {
            state: ElectionState::new(id, self.config),
            transport: self.transport.clone(),
            live_topic: live_topic.clone(),
            vote_topic: vote_topic.clone(),
            clock: Clock::new(),
            on_primary: Box::new(on_primary),
            on_replica: Box::new(on_replica),
            primary_tx,
        };
        let task = tokio::spawn(driver.run(live_rx, vote_rx, shutdown_rx));

        self.running = Some(Running {
            id,
            live_topic,
            live_subscription,
            vote_topic,
            vote_subscription,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            primary: primary_rx,
        });

        tracing::info!(
            node_id = %id,
            name = %self.name,
            live_interval_ms = self.config.live_interval_ms(),
            "Syncer initialized"
        );
        Ok(id)
    }

    /// Stops both timers, waits for the driver to exit, unsubscribes both
    /// topics and closes the transport. No callback fires after this returns.
    ///
    /// Every teardown step runs even when an earlier one fails (a panicked
    /// callback, an already closed transport); the first failure is returned.
    pub async fn destroy(mut self) -> Result<()> {
        let mut running = self.running.take().ok_or(SyncerError::NotInitialized)?;

        if let Some(shutdown) = running.shutdown.take() {
            let _ = shutdown.send(());
        }
        let joined = match running.task.take() {
            Some(task) => task.await.map_err(|e| SyncerError::Driver(e.to_string())),
            None => Ok(()),
        };

        let live = self
            .transport
            .unsubscribe(&running.live_topic, running.live_subscription)
            .await
            .map_err(SyncerError::from);
        let vote = self
            .transport
            .unsubscribe(&running.vote_topic, running.vote_subscription)
            .await
            .map_err(SyncerError::from);
        let closed = self.transport.close().await.map_err(SyncerError::from);

        let result = joined.and(live).and(vote).and(closed);
        match &result {
            Ok(()) => tracing::info!(node_id = %running.id, name = %self.name, "Syncer destroyed"),
            Err(e) => tracing::warn!(node_id = %running.id, name = %self.name, error = %e, "Syncer destroyed with errors"),
        }
        result
    }
}

impl<T: Transport> Drop for ElectionNode<T> {
    fn drop(&mut self) {
        // Not destroyed: stop the driver; subscriptions are left to the transport.
        if let Some(mut running) = self.running.take() {
            if let Some(shutdown) = running.shutdown.take() {
                let _ = shutdown.send(());
            }
            if let Some(task) = running.task.take() {
                task.abort();
            }
        }
    }
}

/// The task that owns an initialized node's state.
struct Driver<T: Transport> {
    state: ElectionState,
    transport: Arc<T>,
    live_topic: String,
    vote_topic: String,
    clock: Clock,
    on_primary: RoleCallback,
    on_replica: RoleCallback,
    primary_tx: watch::Sender<Option<NodeId>>,
}

impl<T: Transport> Driver<T> {
    async fn run(
        mut self,
        mut live_rx: mpsc::UnboundedReceiver<Bytes>,
        mut vote_rx: mpsc::UnboundedReceiver<Bytes>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let node_id = self.state.id();
        let live_period = self.state.config().live_interval();
        let vote_period = self.state.config().vote_interval();

        // First ticks one full period after start.
        let mut heartbeat = time::interval_at(Instant::now() + live_period, live_period);
        let mut failure_check = time::interval_at(Instant::now() + vote_period, vote_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        failure_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let actions = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                payload = live_rx.recv() => match payload {
                    Some(payload) => self.on_live(&payload),
                    None => {
                        tracing::error!(node_id = %node_id, topic = %self.live_topic, "Live subscription closed, stopping");
                        break;
                    }
                },
                payload = vote_rx.recv() => match payload {
                    Some(payload) => self.on_vote(&payload),
                    None => {
                        tracing::error!(node_id = %node_id, topic = %self.vote_topic, "Vote subscription closed, stopping");
                        break;
                    }
                },
                _ = heartbeat.tick() => self.state.heartbeat(self.clock.now_millis()),
                _ = failure_check.tick() => self.state.check_primary(self.clock.now_millis()),
            };
            self.apply(actions).await;
        }

        tracing::debug!(node_id = %node_id, "Driver stopped");
    }

    fn on_live(&mut self, payload: &[u8]) -> Vec<Action> {
        match LiveMessage::decode(payload) {
            Ok(msg) => {
                tracing::trace!(node_id = %self.state.id(), from = %msg.id, primary = msg.primary, "Beacon received");
                self.state.handle_live(&msg)
            }
            Err(e) => {
                tracing::warn!(node_id = %self.state.id(), error = %e, "Dropping malformed liveness message");
                Vec::new()
            }
        }
    }

    fn on_vote(&mut self, payload: &[u8]) -> Vec<Action> {
        match VoteMessage::decode(payload) {
            Ok(msg) => {
                tracing::trace!(
                    node_id = %self.state.id(),
                    vote_id = %msg.vote_id,
                    voter = %msg.id,
                    candidate = %msg.vote,
                    "Ballot received"
                );
                self.state.handle_vote(self.clock.now_millis(), &msg)
            }
            Err(e) => {
                tracing::warn!(node_id = %self.state.id(), error = %e, "Dropping malformed vote message");
                Vec::new()
            }
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        let node_id = self.state.id();
        for action in actions {
            match action {
                Action::PublishLive(msg) => {
                    publish(self.transport.as_ref(), &self.live_topic, node_id, msg.encode()).await
                }
                Action::PublishVote(msg) => {
                    publish(self.transport.as_ref(), &self.vote_topic, node_id, msg.encode()).await
                }
                Action::Promoted(id) => (self.on_primary)(id),
                Action::Demoted(primary) => (self.on_replica)(primary),
            }
        }

        let belief = self.state.primary();
        self.primary_tx.send_if_modified(|current| {
            if *current == belief {
                return false;
            }
            *current = belief;
            true
        });
    }
}

/// Fire-and-forget broadcast; failures only get logged.
async fn publish<T: Transport>(transport: &T, topic: &str, node_id: NodeId, payload: Result<Bytes>) {
    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(node_id = %node_id, topic, error = %e, "Failed to encode message");
            return;
        }
    };
    if let Err(e) = transport.publish(topic, payload).await {
        tracing::warn!(node_id = %node_id, topic, error = %e, "Publish failed");
    }
}
