//! The election state machine of one node.
//!
//! Pure and synchronous: every entry point takes the current time in epoch
//! milliseconds and returns the [`Action`]s the driver must carry out
//! (broadcasts and role callbacks). The async driver in `node` feeds it
//! timer ticks and inbound messages one at a time.

use crate::config::Config;
use crate::election::{Outcome, VoteRound};
use crate::id::{NodeId, VoteId};
use crate::message::{LiveMessage, VoteMessage};
use crate::registry::NodeRegistry;

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Broadcast a liveness beacon.
    PublishLive(LiveMessage),
    /// Broadcast a ballot.
    PublishVote(VoteMessage),
    /// This node became primary; fire the primary callback with its id.
    Promoted(NodeId),
    /// This node stopped being primary; fire the replica callback with the
    /// new primary.
    Demoted(NodeId),
}

/// Whether an election round is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Voting { started_at: u64 },
}

#[derive(Debug, Clone)]
pub struct ElectionState {
    id: NodeId,
    config: Config,
    registry: NodeRegistry,
    round: VoteRound,
    vote_started: Option<u64>,
    primary: Option<NodeId>,
}

impl ElectionState {
    pub fn new(id: NodeId, config: Config) -> Self {
        Self {
            id,
            config,
            registry: NodeRegistry::new(),
            round: VoteRound::new(),
            vote_started: None,
            primary: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn round(&self) -> &VoteRound {
        &self.round
    }

    pub fn primary(&self) -> Option<NodeId> {
        self.primary
    }

    pub fn is_primary(&self) -> bool {
        self.primary == Some(self.id)
    }

    pub fn vote_started(&self) -> Option<u64> {
        self.vote_started
    }

    pub fn phase(&self, now: u64) -> Phase {
        match self.vote_started {
            Some(started_at) if now.saturating_sub(started_at) < self.config.vote_interval_ms() => {
                Phase::Voting { started_at }
            }
            _ => Phase::Idle,
        }
    }

    /// Heartbeat tick: refresh our own entry and advertise ourselves.
    pub fn heartbeat(&mut self, now: u64) -> Vec<Action> {
        self.registry.record(self.id, now);

        if self.config.debug() {
            tracing::info!(
                node_id = %self.id,
                is_primary = self.is_primary(),
                nodes = ?self.registry,
                "Heartbeat"
            );
        } else {
            tracing::trace!(node_id = %self.id, is_primary = self.is_primary(), known = self.registry.len(), "Heartbeat");
        }

        vec![Action::PublishLive(LiveMessage {
            id: self.id,
            timestamp: now,
            primary: self.is_primary(),
        })]
    }

    /// Inbound beacon, our own loopback included.
    pub fn handle_live(&mut self, msg: &LiveMessage) -> Vec<Action> {
        let mut actions = Vec::new();
        self.registry.record(msg.id, msg.timestamp);

        if msg.primary && self.primary != Some(msg.id) {
            tracing::debug!(node_id = %self.id, claimed = %msg.id, "Adopting primary from beacon");
            self.set_active(msg.id, &mut actions);
        }
        actions
    }

    /// Whether the believed primary is unknown or has not been heard from
    /// for a dead interval.
    pub fn primary_is_stale(&self, now: u64) -> bool {
        match self.primary.and_then(|p| self.registry.last_seen(&p)) {
            Some(seen) => now.saturating_sub(seen) >= self.config.dead_interval_ms(),
            None => true,
        }
    }

    /// Failure-check tick: start a round when the primary is stale and no
    /// round started within `vote_interval + live_interval`.
    pub fn check_primary(&mut self, now: u64) -> Vec<Action> {
        if !self.primary_is_stale(now) {
            return Vec::new();
        }

        let cooldown = self.config.vote_interval_ms() + self.config.live_interval_ms();
        let cooled_down = self
            .vote_started
            .map_or(true, |started| now.saturating_sub(started) >= cooldown);
        if !cooled_down {
            tracing::trace!(node_id = %self.id, "Primary stale but a round is recent, waiting");
            return Vec::new();
        }

        tracing::debug!(node_id = %self.id, primary = ?self.primary, "Primary stale, starting election");
        self.start_vote(now, None)
    }

    /// Starts (or joins) a round and evaluates the decision rule.
    pub fn start_vote(&mut self, now: u64, vote_id: Option<VoteId>) -> Vec<Action> {
        let mut actions = Vec::new();
        self.open_round(now, vote_id, &mut actions);
        self.decide(&mut actions);
        actions
    }

    /// Inbound ballot, our own loopback included.
    pub fn handle_vote(&mut self, now: u64, msg: &VoteMessage) -> Vec<Action> {
        let mut actions = Vec::new();
        self.open_round(now, Some(msg.vote_id), &mut actions);

        if self.round.cast(msg.id, msg.vote) {
            tracing::trace!(node_id = %self.id, voter = %msg.id, candidate = %msg.vote, "Ballot recorded");
        }
        self.decide(&mut actions);
        actions
    }

    /// Opens a new round unless one started less than a vote interval ago.
    fn open_round(&mut self, now: u64, vote_id: Option<VoteId>, actions: &mut Vec<Action>) {
        if let Phase::Voting { started_at } = self.phase(now) {
            tracing::trace!(node_id = %self.id, started_at, "Round already in progress");
            return;
        }

        let vote_id = vote_id.unwrap_or_else(VoteId::random);
        self.round.reset(vote_id);
        self.vote_started = Some(now);

        let pruned = self.registry.prune(now, self.config.dead_interval_ms());
        if !pruned.is_empty() {
            tracing::debug!(node_id = %self.id, ?pruned, "Pruned dead nodes");
        }

        let Some(candidate) = self.registry.lowest() else {
            tracing::debug!(node_id = %self.id, %vote_id, "Round opened with no known nodes, abstaining");
            return;
        };

        tracing::debug!(
            node_id = %self.id,
            %vote_id,
            %candidate,
            known = self.registry.len(),
            "Election round started"
        );

        actions.push(Action::PublishVote(VoteMessage {
            vote_id,
            id: self.id,
            vote: candidate,
        }));
        self.round.cast(self.id, candidate);
    }

    fn decide(&mut self, actions: &mut Vec<Action>) {
        match self.round.outcome(self.registry.len()) {
            Outcome::Pending { cast, needed } => {
                tracing::trace!(node_id = %self.id, cast, needed, "Waiting for ballots");
            }
            Outcome::Tied { candidates, votes } => {
                tracing::debug!(node_id = %self.id, ?candidates, votes, "Split vote, no decision");
            }
            Outcome::Elected { winner, votes } => {
                if self.primary != Some(winner) {
                    tracing::debug!(node_id = %self.id, %winner, votes, "Election decided");
                }
                self.set_active(winner, actions);
            }
        }
    }

    /// Role transition towards `primary`.
    fn set_active(&mut self, primary: NodeId, actions: &mut Vec<Action>) {
        if self.primary == Some(primary) {
            return;
        }

        if primary == self.id {
            tracing::info!(node_id = %self.id, "Became primary");
            actions.push(Action::Promoted(primary));
        } else if self.is_primary() {
            tracing::info!(node_id = %self.id, new_primary = %primary, "Stepped down to replica");
            actions.push(Action::Demoted(primary));
        } else {
            tracing::info!(node_id = %self.id, %primary, previous = ?self.primary, "Primary changed");
        }

        self.primary = Some(primary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: u64 = 50;

    fn id(v: f64) -> NodeId {
        NodeId::new(v).unwrap()
    }

    fn state(v: f64) -> ElectionState {
        ElectionState::new(id(v), Config::new(LIVE))
    }

    fn beacon(v: f64, timestamp: u64, primary: bool) -> LiveMessage {
        LiveMessage {
            id: id(v),
            timestamp,
            primary,
        }
    }

    fn ballot(vote_id: f64, voter: f64, candidate: f64) -> VoteMessage {
        VoteMessage {
            vote_id: VoteId::new(vote_id),
            id: id(voter),
            vote: id(candidate),
        }
    }

    fn proposals(actions: &[Action]) -> Vec<NodeId> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::PublishVote(v) => Some(v.vote),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn heartbeat_records_self_and_advertises_role() {
        let mut node = state(0.4);
        let actions = node.heartbeat(1_000);
        assert_eq!(node.registry().last_seen(&id(0.4)), Some(1_000));
        assert_eq!(actions, vec![Action::PublishLive(beacon(0.4, 1_000, false))]);
    }

    #[test]
    fn primary_beacon_is_adopted_without_callback() {
        let mut node = state(0.4);
        let actions = node.handle_live(&beacon(0.1, 1_000, true));
        assert!(actions.is_empty());
        assert_eq!(node.primary(), Some(id(0.1)));

        // Repeated claims are no-ops.
        assert!(node.handle_live(&beacon(0.1, 1_050, true)).is_empty());
    }

    #[test]
    fn primary_beacon_demotes_current_primary() {
        let mut node = state(0.4);
        node.heartbeat(1_000);
        node.start_vote(1_000, None);
        assert!(node.is_primary());

        let actions = node.handle_live(&beacon(0.1, 1_010, true));
        assert_eq!(actions, vec![Action::Demoted(id(0.1))]);
        assert_eq!(node.primary(), Some(id(0.1)));
    }

    #[test]
    fn completed_round_demotes_current_primary() {
        let mut node = state(0.3);
        node.heartbeat(1_000);
        node.start_vote(1_000, None);
        assert!(node.is_primary());

        // A lower id appears; the next round elects it.
        node.handle_live(&beacon(0.1, 1_200, false));
        node.heartbeat(1_200);
        let actions = node.handle_vote(1_200, &ballot(0.7, 0.1, 0.1));

        assert_eq!(proposals(&actions), vec![id(0.1)]);
        assert!(actions.contains(&Action::Demoted(id(0.1))));
        assert!(!actions.iter().any(|a| matches!(a, Action::Promoted(_))));
        assert_eq!(node.primary(), Some(id(0.1)));
        assert!(!node.is_primary());
    }

    #[test]
    fn sole_node_elects_itself() {
        let mut node = state(0.9);
        node.heartbeat(1_000);
        let actions = node.check_primary(1_100);
        assert!(actions.contains(&Action::Promoted(id(0.9))));
        assert!(node.is_primary());
    }

    #[test]
    fn lowest_id_is_proposed() {
        let mut node = state(0.7);
        node.handle_live(&beacon(0.7, 1_000, false));
        node.handle_live(&beacon(0.2, 1_000, false));
        node.handle_live(&beacon(0.5, 1_000, false));

        let actions = node.start_vote(1_010, None);
        assert_eq!(proposals(&actions), vec![id(0.2)]);
        assert_eq!(node.round().ballot_of(&id(0.7)), Some(id(0.2)));
        // Only one ballot of three: no decision yet.
        assert_eq!(node.primary(), None);
    }

    #[test]
    fn second_start_within_vote_interval_is_ignored() {
        let mut node = state(0.7);
        node.handle_live(&beacon(0.7, 1_000, false));
        node.handle_live(&beacon(0.2, 1_000, false));

        node.start_vote(1_000, Some(VoteId::new(0.11)));
        node.handle_vote(1_010, &ballot(0.11, 0.2, 0.2));
        let tally_before = node.round().tally();

        let actions = node.start_vote(1_000 + 2 * LIVE - 1, Some(VoteId::new(0.99)));
        assert!(actions.is_empty());
        assert_eq!(node.vote_started(), Some(1_000));
        assert_eq!(node.round().id(), Some(VoteId::new(0.11)));
        assert_eq!(node.round().tally(), tally_before);
    }

    #[test]
    fn start_after_vote_interval_resets_round() {
        let mut node = state(0.7);
        node.handle_live(&beacon(0.7, 1_000, false));
        node.handle_live(&beacon(0.2, 1_000, false));
        node.start_vote(1_000, None);

        node.start_vote(1_000 + 2 * LIVE, Some(VoteId::new(0.5)));
        assert_eq!(node.vote_started(), Some(1_000 + 2 * LIVE));
        assert_eq!(node.round().id(), Some(VoteId::new(0.5)));
        assert_eq!(node.round().ballots_cast(), 1);
    }

    #[test]
    fn stale_nodes_are_pruned_and_leave_quorum() {
        let mut node = state(0.3);
        node.handle_live(&beacon(0.1, 1_000, false));
        node.handle_live(&beacon(0.3, 1_300, false));

        // 0.1 silent for exactly dead_interval (250ms).
        let actions = node.start_vote(1_250, None);
        assert!(!node.registry().contains(&id(0.1)));
        assert_eq!(node.registry().len(), 1);
        assert_eq!(proposals(&actions), vec![id(0.3)]);
        assert!(actions.contains(&Action::Promoted(id(0.3))));
    }

    #[test]
    fn tie_defers_transition() {
        let mut node = state(0.2);
        node.handle_live(&beacon(0.1, 1_000, false));
        node.handle_live(&beacon(0.2, 1_000, false));

        // Racing proposals: each node proposed itself in the same round.
        node.round.reset(VoteId::new(0.5));
        node.vote_started = Some(1_000);
        node.round.cast(id(0.2), id(0.2));
        let actions = node.handle_vote(1_001, &ballot(0.5, 0.1, 0.1));

        assert_eq!(node.round().ballots_cast(), 2);
        assert_eq!(node.primary(), None);
        assert!(actions.is_empty());

        // A later round with converged membership breaks the tie.
        node.handle_live(&beacon(0.1, 1_100, false));
        node.handle_live(&beacon(0.2, 1_100, false));
        let mut actions = node.start_vote(1_100, None);
        let vote_id = node.round().id().unwrap().value();
        actions.extend(node.handle_vote(1_101, &ballot(vote_id, 0.1, 0.1)));
        assert_eq!(proposals(&actions), vec![id(0.1)]);
        assert_eq!(node.primary(), Some(id(0.1)));
    }

    #[test]
    fn incoming_vote_joins_round_and_decides() {
        let mut node = state(0.2);
        node.handle_live(&beacon(0.1, 1_000, false));
        node.handle_live(&beacon(0.2, 1_000, false));

        let actions = node.handle_vote(1_010, &ballot(0.42, 0.1, 0.1));

        assert_eq!(node.round().id(), Some(VoteId::new(0.42)));
        assert_eq!(proposals(&actions), vec![id(0.1)]);
        assert_eq!(node.primary(), Some(id(0.1)));
        // Never primary, so no callback.
        assert!(!actions.iter().any(|a| matches!(a, Action::Promoted(_) | Action::Demoted(_))));
    }

    #[test]
    fn duplicate_ballots_do_not_reach_quorum() {
        let mut node = state(0.3);
        for v in [0.1, 0.2, 0.3] {
            node.handle_live(&beacon(v, 1_000, false));
        }
        node.start_vote(1_000, None);
        node.handle_vote(1_001, &ballot(0.5, 0.2, 0.1));
        node.handle_vote(1_002, &ballot(0.5, 0.2, 0.1));

        assert_eq!(node.round().ballots_cast(), 2);
        assert_eq!(node.primary(), None);

        node.handle_vote(1_003, &ballot(0.5, 0.1, 0.1));
        assert_eq!(node.primary(), Some(id(0.1)));
    }

    #[test]
    fn failure_check_waits_out_recent_round() {
        let mut node = state(0.3);
        node.handle_live(&beacon(0.1, 1_000, false));
        node.handle_live(&beacon(0.3, 1_000, false));

        assert!(!node.check_primary(1_000).is_empty());
        assert_eq!(node.vote_started(), Some(1_000));

        // Still inside vote_interval + live_interval (150ms).
        assert!(node.check_primary(1_149).is_empty());
        assert_eq!(node.vote_started(), Some(1_000));

        node.handle_live(&beacon(0.1, 1_100, false));
        node.handle_live(&beacon(0.3, 1_100, false));
        assert!(!node.check_primary(1_150).is_empty());
        assert_eq!(node.vote_started(), Some(1_150));
    }

    #[test]
    fn fresh_primary_suppresses_failure_check() {
        let mut node = state(0.3);
        node.handle_live(&beacon(0.1, 1_000, true));
        assert!(!node.primary_is_stale(1_249));
        assert!(node.check_primary(1_249).is_empty());
        assert!(node.primary_is_stale(1_250));
    }

    #[test]
    fn phase_tracks_vote_interval() {
        let mut node = state(0.3);
        assert_eq!(node.phase(1_000), Phase::Idle);
        node.start_vote(1_000, None);
        assert_eq!(node.phase(1_050), Phase::Voting { started_at: 1_000 });
        assert_eq!(node.phase(1_100), Phase::Idle);
    }

    #[test]
    fn empty_registry_abstains() {
        let mut node = state(0.3);
        let actions = node.start_vote(1_000, None);
        assert!(actions.is_empty());
        assert_eq!(node.vote_started(), Some(1_000));
        assert_eq!(node.round().ballots_cast(), 0);
        assert_eq!(node.primary(), None);
    }

    #[test]
    fn failover_promotes_next_lowest() {
        let mut node = state(0.2);
        for v in [0.1, 0.2, 0.3] {
            node.handle_live(&beacon(v, 1_000, false));
        }
        node.handle_live(&beacon(0.1, 1_000, true));
        assert_eq!(node.primary(), Some(id(0.1)));

        // 0.1 goes silent; the others keep beating.
        node.handle_live(&beacon(0.2, 1_300, false));
        node.handle_live(&beacon(0.3, 1_300, false));

        let mut actions = node.check_primary(1_300);
        assert_eq!(proposals(&actions), vec![id(0.2)]);
        actions.extend(node.handle_vote(1_305, &ballot(0.8, 0.3, 0.2)));

        assert!(actions.contains(&Action::Promoted(id(0.2))));
        assert_eq!(node.primary(), Some(id(0.2)));
    }
}
