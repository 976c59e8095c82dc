use crate::id::NodeId;
use std::collections::BTreeMap;

/// Last beacon timestamp per known node.
///
/// The only view of cluster membership: entries appear when a beacon
/// arrives and disappear when pruned as dead. Iteration is ascending by id.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, u64>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as seen at `timestamp`, overwriting any earlier entry.
    pub fn record(&mut self, id: NodeId, timestamp: u64) {
        self.nodes.insert(id, timestamp);
    }

    pub fn last_seen(&self, id: &NodeId) -> Option<u64> {
        self.nodes.get(id).copied()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Removes every entry with `now - last_seen >= dead_after` and returns
    /// the removed ids.
    pub fn prune(&mut self, now: u64, dead_after: u64) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, seen)| now.saturating_sub(**seen) >= dead_after)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.nodes.remove(id);
        }
        dead
    }

    /// Lowest known id, the election candidate.
    pub fn lowest(&self) -> Option<NodeId> {
        self.nodes.keys().next().copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: f64) -> NodeId {
        NodeId::new(v).unwrap()
    }

    #[test]
    fn record_overwrites_timestamp() {
        let mut registry = NodeRegistry::new();
        registry.record(id(0.3), 10);
        registry.record(id(0.3), 25);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.last_seen(&id(0.3)), Some(25));
    }

    #[test]
    fn lowest_is_smallest_id() {
        let mut registry = NodeRegistry::new();
        assert_eq!(registry.lowest(), None);
        registry.record(id(0.7), 1);
        registry.record(id(0.2), 1);
        registry.record(id(0.5), 1);
        assert_eq!(registry.lowest(), Some(id(0.2)));
        let ids: Vec<f64> = registry.ids().map(|n| n.value()).collect();
        assert_eq!(ids, vec![0.2, 0.5, 0.7]);
    }

    #[test]
    fn prune_removes_entries_at_or_past_deadline() {
        let mut registry = NodeRegistry::new();
        registry.record(id(0.1), 1_000);
        registry.record(id(0.2), 1_499);
        registry.record(id(0.3), 1_501);

        let removed = registry.prune(2_000, 500);

        assert_eq!(removed, vec![id(0.1), id(0.2)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id(0.3)));
    }

    #[test]
    fn prune_tolerates_future_timestamps() {
        let mut registry = NodeRegistry::new();
        registry.record(id(0.4), 5_000);
        assert!(registry.prune(1_000, 100).is_empty());
        assert!(!registry.is_empty());
    }
}
