use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::model::node::NodeId;

/// Cost sentinel for an absent or down edge. Any sum of real costs along a
/// path stays below `INF / 4`, so the quarter threshold cleanly separates
/// reachable from unreachable without restructuring the adjacency maps.
pub const INF: u32 = u32::MAX;

pub fn is_reachable(cost: u32) -> bool {
    cost < INF / 4
}

pub type AdjMap = BTreeMap<NodeId, u32>;
pub type Graph = BTreeMap<NodeId, AdjMap>;

/// All per-node protocol state: the immutable seed topology, the live graph,
/// and the dense-index parallel arrays for sequence numbers and liveness.
///
/// Nodes are discovered at boot from the seed file (plus, rarely, from an LSA
/// whose source the file never mentioned); a node never leaves the index, its
/// `is_up` flag flips instead.
pub struct TopologyStore {
    local: NodeId,
    seed: Graph,
    live: Graph,
    index: BTreeMap<NodeId, usize>,
    largest_seq_no: Vec<u32>,
    is_up: Vec<bool>,
}

impl TopologyStore {
    pub fn from_seed(local: NodeId, seed: Graph) -> Result<Self> {
        if !seed.contains_key(&local) {
            return Err(anyhow!("local node {local} does not appear in the topology file"));
        }
        let mut index = BTreeMap::new();
        let mut largest_seq_no = Vec::new();
        let mut is_up = Vec::new();
        for node in seed.keys() {
            index.insert(*node, largest_seq_no.len());
            largest_seq_no.push(0);
            is_up.push(true);
        }
        Ok(Self {
            local,
            live: seed.clone(),
            seed,
            index,
            largest_seq_no,
            is_up,
        })
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn live(&self) -> &Graph {
        &self.live
    }

    /// Direct neighbors as listed in the seed file, liveness regardless.
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.seed
            .get(&self.local)
            .map(|adj| adj.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_neighbor(&self, node: NodeId) -> bool {
        self.seed
            .get(&self.local)
            .is_some_and(|adj| adj.contains_key(&node))
    }

    /// Seed cost of the direct edge to a neighbor.
    pub fn neighbor_cost(&self, node: NodeId) -> Option<u32> {
        self.seed
            .get(&self.local)
            .and_then(|adj| adj.get(&node))
            .copied()
    }

    pub fn is_up(&self, node: NodeId) -> bool {
        self.index
            .get(&node)
            .is_some_and(|&i| self.is_up[i])
    }

    pub fn largest_seq_no(&self, node: NodeId) -> Option<u32> {
        self.index.get(&node).map(|&i| self.largest_seq_no[i])
    }

    /// Sequence-number gate: accepts only strictly greater values, growing
    /// the index for sources the seed file never mentioned. This is the sole
    /// guard against flood loops.
    pub fn accept_seq_no(&mut self, src: NodeId, seq_no: u32) -> bool {
        let i = self.ensure_node(src);
        if self.largest_seq_no[i] >= seq_no {
            return false;
        }
        self.largest_seq_no[i] = seq_no;
        true
    }

    /// A HELLO arrived from a neighbor previously considered down: flip it
    /// up and restore both directions of the edge from the seed snapshot.
    /// Returns whether anything changed.
    pub fn neighbor_recovered(&mut self, neighbor: NodeId) -> bool {
        let Some(&i) = self.index.get(&neighbor) else {
            return false;
        };
        if self.is_up[i] {
            return false;
        }
        self.is_up[i] = true;
        self.restore_edge(neighbor);
        true
    }

    /// The neighbor missed its HELLO deadline: flip it down and mark both
    /// directions of the edge unreachable. Returns whether anything changed.
    pub fn neighbor_lost(&mut self, neighbor: NodeId) -> bool {
        let Some(&i) = self.index.get(&neighbor) else {
            return false;
        };
        if !self.is_up[i] {
            return false;
        }
        self.is_up[i] = false;
        self.set_edge(self.local, neighbor, INF);
        true
    }

    /// Applies a fresh LSA payload from `src`: diffs the advertised adjacency
    /// against `live[src]` restricted to the seed edges, flipping remote
    /// liveness and mirroring each changed edge in both directions. The edge
    /// back to `self` is skipped — local adjacency is owned by the neighbor
    /// monitor, not by what a neighbor last advertised.
    ///
    /// Recovered edges take their cost from the seed snapshot, never from
    /// the wire.
    pub fn apply_lsa(&mut self, src: NodeId, advertised: &AdjMap) -> bool {
        self.ensure_node(src);
        let seed_edges: Vec<(NodeId, u32)> = self
            .seed
            .get(&src)
            .map(|adj| adj.iter().map(|(n, c)| (*n, *c)).collect())
            .unwrap_or_default();

        let mut changed = false;
        for (peer, seed_cost) in seed_edges {
            if peer == self.local {
                continue;
            }
            let was_up = self
                .live
                .get(&src)
                .and_then(|adj| adj.get(&peer))
                .copied()
                .map(is_reachable)
                .unwrap_or(false);
            let now_up = advertised
                .get(&peer)
                .copied()
                .map(is_reachable)
                .unwrap_or(false);
            if was_up == now_up {
                continue;
            }
            let cost = if now_up { seed_cost } else { INF };
            self.set_edge(src, peer, cost);
            let i = self.ensure_node(peer);
            self.is_up[i] = now_up;
            changed = true;
        }
        changed
    }

    /// The local adjacency filtered to finite edges, i.e. the payload of an
    /// LSA originated by this node.
    pub fn local_adjacency(&self) -> AdjMap {
        self.live
            .get(&self.local)
            .map(|adj| {
                adj.iter()
                    .filter(|(_, &cost)| is_reachable(cost))
                    .map(|(n, c)| (*n, *c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Textual topology report: one line per node listing its finite edges,
    /// nodes with none suppressed.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for (node, adj) in &self.live {
            let edges: Vec<String> = adj
                .iter()
                .filter(|(_, &cost)| is_reachable(cost))
                .map(|(peer, cost)| format!(" {peer},{cost}"))
                .collect();
            if edges.is_empty() {
                continue;
            }
            lines.push(format!("{node}{}", edges.concat()));
        }
        lines.join("\n")
    }

    fn ensure_node(&mut self, node: NodeId) -> usize {
        if let Some(&i) = self.index.get(&node) {
            return i;
        }
        let i = self.largest_seq_no.len();
        self.index.insert(node, i);
        self.largest_seq_no.push(0);
        self.is_up.push(true);
        self.seed.entry(node).or_default();
        self.live.entry(node).or_default();
        i
    }

    fn restore_edge(&mut self, neighbor: NodeId) {
        let forward = self
            .seed
            .get(&self.local)
            .and_then(|adj| adj.get(&neighbor))
            .copied();
        if let Some(cost) = forward {
            self.live.entry(self.local).or_default().insert(neighbor, cost);
        }
        let reverse = self
            .seed
            .get(&neighbor)
            .and_then(|adj| adj.get(&self.local))
            .copied();
        if let Some(cost) = reverse {
            self.live.entry(neighbor).or_default().insert(self.local, cost);
        }
    }

    fn set_edge(&mut self, a: NodeId, b: NodeId, cost: u32) {
        self.live.entry(a).or_default().insert(b, cost);
        self.live.entry(b).or_default().insert(a, cost);
    }
}
