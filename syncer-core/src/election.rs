//! Single-round plurality vote.
//!
//! A round collects at most one ballot per voter. Once as many ballots have
//! been cast as there are known nodes, the candidate with the strictly
//! largest tally wins; a shared maximum yields no winner.

use crate::id::{NodeId, VoteId};
use std::collections::{BTreeMap, HashMap};

/// Result of evaluating the decision rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fewer ballots than known nodes.
    Pending { cast: usize, needed: usize },
    /// Several candidates share the top tally.
    Tied { candidates: Vec<NodeId>, votes: usize },
    /// Unique winner.
    Elected { winner: NodeId, votes: usize },
}

#[derive(Debug, Clone, Default)]
pub struct VoteRound {
    id: Option<VoteId>,
    ballots: HashMap<NodeId, NodeId>,
}

impl VoteRound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all ballots and opens round `id`.
    pub fn reset(&mut self, id: VoteId) {
        self.id = Some(id);
        self.ballots.clear();
    }

    pub fn id(&self) -> Option<VoteId> {
        self.id
    }

    /// Records `voter`'s ballot for `candidate`.
    ///
    /// A voter holds a single ballot: a repeated ballot is a no-op and a
    /// changed one replaces the earlier choice. Returns whether the round
    /// changed.
    pub fn cast(&mut self, voter: NodeId, candidate: NodeId) -> bool {
        self.ballots.insert(voter, candidate) != Some(candidate)
    }

    pub fn ballot_of(&self, voter: &NodeId) -> Option<NodeId> {
        self.ballots.get(voter).copied()
    }

    pub fn ballots_cast(&self) -> usize {
        self.ballots.len()
    }

    /// Votes per candidate, ascending by candidate id.
    pub fn tally(&self) -> BTreeMap<NodeId, usize> {
        let mut tally = BTreeMap::new();
        for candidate in self.ballots.values() {
            *tally.entry(*candidate).or_insert(0) += 1;
        }
        tally
    }

    /// Applies the decision rule against a quorum of `known_nodes`.
    pub fn outcome(&self, known_nodes: usize) -> Outcome {
        let cast = self.ballots_cast();
        if cast == 0 || cast < known_nodes {
            return Outcome::Pending {
                cast,
                needed: known_nodes,
            };
        }

        let tally = self.tally();
        let top = tally.values().copied().max().unwrap_or(0);
        let leaders: Vec<NodeId> = tally
            .into_iter()
            .filter(|(_, votes)| *votes == top)
            .map(|(candidate, _)| candidate)
            .collect();

        match leaders.as_slice() {
            [winner] => Outcome::Elected {
                winner: *winner,
                votes: top,
            },
            _ => Outcome::Tied {
                candidates: leaders,
                votes: top,
            },
        }
    }
}
