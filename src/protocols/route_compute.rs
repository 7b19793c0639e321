use std::collections::{BTreeMap, BTreeSet};

use crate::model::node::NodeId;
use crate::model::topology::{is_reachable, Graph};

/// Shortest-path result: total cost and first-hop neighbor per destination.
/// Destinations unreachable from the source appear in neither map.
#[derive(Debug, Clone)]
pub struct SpfResult {
    pub dist: BTreeMap<NodeId, u64>,
    pub first_hop: BTreeMap<NodeId, NodeId>,
}

/// Classical Dijkstra over the live graph. Edges at or above the
/// unreachability threshold are treated as absent. Path costs accumulate in
/// `u64` so sums of real `u32` costs cannot saturate. Ties settle on the
/// lower node id, which makes first-hop selection deterministic across runs.
pub fn compute_spf(graph: &Graph, src: NodeId) -> SpfResult {
    let mut dist: BTreeMap<NodeId, u64> = BTreeMap::new();
    let mut first_hop: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();

    dist.insert(src, 0);

    loop {
        let mut candidate: Option<(NodeId, u64)> = None;
        for (node, node_dist) in &dist {
            if visited.contains(node) {
                continue;
            }
            match candidate {
                None => candidate = Some((*node, *node_dist)),
                Some((best_node, best_dist)) => {
                    if *node_dist < best_dist || (*node_dist == best_dist && *node < best_node) {
                        candidate = Some((*node, *node_dist));
                    }
                }
            }
        }

        let Some((u, cost_u)) = candidate else {
            break;
        };
        visited.insert(u);

        if let Some(neighbors) = graph.get(&u) {
            for (v, edge_cost) in neighbors {
                if !is_reachable(*edge_cost) {
                    continue;
                }
                let candidate_metric = cost_u + u64::from(*edge_cost);
                let candidate_hop = if u == src {
                    *v
                } else {
                    *first_hop.get(&u).unwrap_or(v)
                };

                let best = dist.get(v).copied().unwrap_or(u64::MAX);
                if candidate_metric < best
                    || (candidate_metric == best
                        && first_hop.get(v).is_some_and(|hop| candidate_hop < *hop))
                {
                    dist.insert(*v, candidate_metric);
                    first_hop.insert(*v, candidate_hop);
                }
            }
        }
    }

    SpfResult { dist, first_hop }
}

/// Destination → next-hop entries for every node reachable from `src`,
/// excluding `src` itself. The next hop is always a direct neighbor on the
/// shortest path.
pub fn build_forwarding(graph: &Graph, src: NodeId) -> BTreeMap<NodeId, NodeId> {
    let result = compute_spf(graph, src);
    result
        .dist
        .keys()
        .filter(|dest| **dest != src)
        .filter_map(|dest| result.first_hop.get(dest).map(|hop| (*dest, *hop)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::model::topology::INF;

    fn node(last_octet: u8) -> NodeId {
        NodeId::new(Ipv4Addr::new(127, 0, 0, last_octet), 5000)
    }

    #[test]
    fn shortest_path_prefers_cheaper_two_hop_route() {
        let graph: Graph = BTreeMap::from([
            (node(1), BTreeMap::from([(node(2), 1), (node(3), 4)])),
            (node(2), BTreeMap::from([(node(1), 1), (node(3), 2)])),
            (node(3), BTreeMap::from([(node(1), 4), (node(2), 2)])),
        ]);
        let result = compute_spf(&graph, node(1));
        assert_eq!(result.dist[&node(3)], 3);
        assert_eq!(result.first_hop[&node(3)], node(2));
    }

    #[test]
    fn equal_cost_tie_settles_on_lower_first_hop() {
        let graph: Graph = BTreeMap::from([
            (node(1), BTreeMap::from([(node(2), 1), (node(3), 1)])),
            (node(2), BTreeMap::from([(node(1), 1), (node(4), 1)])),
            (node(3), BTreeMap::from([(node(1), 1), (node(4), 1)])),
            (node(4), BTreeMap::from([(node(2), 1), (node(3), 1)])),
        ]);
        let result = compute_spf(&graph, node(1));
        assert_eq!(result.dist[&node(4)], 2);
        assert_eq!(result.first_hop[&node(4)], node(2));
    }

    #[test]
    fn unreachable_destinations_are_omitted() {
        let graph: Graph = BTreeMap::from([
            (node(1), BTreeMap::from([(node(2), 1), (node(3), INF)])),
            (node(2), BTreeMap::from([(node(1), 1), (node(3), INF)])),
            (node(3), BTreeMap::from([(node(1), INF), (node(2), INF)])),
        ]);
        let table = build_forwarding(&graph, node(1));
        assert_eq!(table, BTreeMap::from([(node(2), node(2))]));
    }

    #[test]
    fn next_hop_is_always_a_direct_neighbor() {
        let graph: Graph = BTreeMap::from([
            (node(1), BTreeMap::from([(node(2), 1)])),
            (node(2), BTreeMap::from([(node(1), 1), (node(3), 1)])),
            (node(3), BTreeMap::from([(node(2), 1), (node(4), 1)])),
            (node(4), BTreeMap::from([(node(3), 1)])),
        ]);
        let table = build_forwarding(&graph, node(1));
        assert_eq!(table.len(), 3);
        for hop in table.values() {
            assert_eq!(*hop, node(2));
        }
        assert_eq!(table[&node(4)], node(2));
    }
}
