//! # Connection Graph
//!
//! Undirected graph of accepted connections, rebuilt from the store when a
//! recommendation or graph query runs.
//!
//! All data structures use `BTreeMap`/`BTreeSet` so iteration order, and
//! therefore every ranking, is deterministic.

use crate::{IndustryId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Weight of one mutual connection in a recommendation score.
pub const MUTUAL_WEIGHT: u64 = 10;

/// Upper bound on BFS depth accepted by [`ConnectionGraph::within`].
pub const MAX_DEPTH: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    adjacency: BTreeMap<UserId, BTreeSet<UserId>>,
}

impl ConnectionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from connected pairs. Self loops are ignored.
    pub fn from_edges(edges: impl IntoIterator<Item = (UserId, UserId)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in edges {
            graph.connect(a, b);
        }
        graph
    }

    pub fn connect(&mut self, a: UserId, b: UserId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    #[must_use]
    pub fn are_connected(&self, a: UserId, b: UserId) -> bool {
        self.adjacency.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Direct connections in id order.
    pub fn neighbors(&self, user: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.adjacency.get(&user).into_iter().flatten().copied()
    }

    /// Users connected to both `a` and `b`.
    #[must_use]
    pub fn mutual(&self, a: UserId, b: UserId) -> Vec<UserId> {
        match (self.adjacency.get(&a), self.adjacency.get(&b)) {
            (Some(x), Some(y)) => x.intersection(y).copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Users reachable from `start` within `depth` hops, with their distance.
    /// `start` itself is not included. Depth is capped at [`MAX_DEPTH`].
    #[must_use]
    pub fn within(&self, start: UserId, depth: usize) -> BTreeMap<UserId, usize> {
        let depth = depth.min(MAX_DEPTH);
        let mut seen = BTreeMap::new();
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut visited = BTreeSet::from([start]);
        while let Some((node, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for next in self.neighbors(node) {
                if visited.insert(next) {
                    seen.insert(next, dist.saturating_add(1));
                    queue.push_back((next, dist.saturating_add(1)));
                }
            }
        }
        seen
    }

    /// Rank candidate connections for `user`.
    ///
    /// Candidates are second-degree connections plus anyone sharing an
    /// industry. `score = mutual * 10 + shared industries`; ties go to the
    /// lower user id. Users in `exclude` (and existing connections) are
    /// never returned.
    #[must_use]
    pub fn recommend(
        &self,
        user: UserId,
        industries: &BTreeMap<UserId, Vec<IndustryId>>,
        exclude: &BTreeSet<UserId>,
    ) -> Vec<Recommendation> {
        let own: BTreeSet<IndustryId> = industries
            .get(&user)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let mut candidates: BTreeSet<UserId> = self
            .within(user, 2)
            .into_iter()
            .filter(|(_, dist)| *dist == 2)
            .map(|(id, _)| id)
            .collect();
        if !own.is_empty() {
            candidates.extend(
                industries
                    .iter()
                    .filter(|(_, ids)| ids.iter().any(|id| own.contains(id)))
                    .map(|(id, _)| *id),
            );
        }

        let mut ranked: Vec<Recommendation> = candidates
            .into_iter()
            .filter(|c| *c != user && !exclude.contains(c) && !self.are_connected(user, *c))
            .map(|candidate| {
                let mutual = self.mutual(user, candidate).len() as u64;
                let shared = industries.get(&candidate).map_or(0, |ids| {
                    ids.iter().filter(|id| own.contains(id)).count() as u64
                });
                Recommendation {
                    user_id: candidate,
                    mutual_connections: mutual,
                    shared_industries: shared,
                    score: mutual.saturating_mul(MUTUAL_WEIGHT).saturating_add(shared),
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.user_id.cmp(&b.user_id)));
        ranked
    }
}

/// A ranked candidate connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub user_id: UserId,
    pub mutual_connections: u64,
    pub shared_industries: u64,
    pub score: u64,
}
