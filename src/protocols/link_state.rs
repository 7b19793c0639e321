use crate::model::node::NodeId;
use crate::model::topology::TopologyStore;
use crate::wire::{LinkStatePacket, LSA_INITIAL_TTL};

/// Outcome of ingesting one received LSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Sequence number at or below the largest seen; dropped silently.
    Stale,
    /// Accepted. `changed` means the live topology moved; `flood` means the
    /// packet still has TTL budget and must be re-emitted with split horizon.
    Fresh { changed: bool, flood: bool },
}

/// Originates and ingests sequence-numbered link-state advertisements.
#[derive(Debug, Default)]
pub struct LinkStateEngine {
    last_seq_sent: u32,
}

impl LinkStateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the next LSA from this node: a fresh sequence number, full TTL
    /// budget, and the live local adjacency filtered to finite edges. The
    /// sequence number is also recorded in the store so an echo of our own
    /// advertisement is recognized as stale.
    pub fn originate(&mut self, store: &mut TopologyStore) -> LinkStatePacket {
        self.last_seq_sent += 1;
        let local = store.local();
        store.accept_seq_no(local, self.last_seq_sent);
        LinkStatePacket {
            src: local,
            last_sender: local,
            seq_no: self.last_seq_sent,
            ttl: LSA_INITIAL_TTL,
            links: store.local_adjacency(),
        }
    }

    pub fn ingest(&mut self, store: &mut TopologyStore, packet: &LinkStatePacket) -> Ingest {
        if !store.accept_seq_no(packet.src, packet.seq_no) {
            return Ingest::Stale;
        }
        let changed = store.apply_lsa(packet.src, &packet.links);
        Ingest::Fresh {
            changed,
            flood: packet.ttl > 0,
        }
    }

    /// Every seed neighbor, up or down, minus the split-horizon exclusion.
    /// Down neighbors still receive floods; HELLO is how they are
    /// rediscovered, and a stale socket send costs nothing.
    pub fn flood_targets(&self, store: &TopologyStore, exclude: Option<NodeId>) -> Vec<NodeId> {
        store
            .neighbors()
            .into_iter()
            .filter(|n| Some(*n) != exclude)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    use super::*;
    use crate::model::topology::Graph;

    fn node(last_octet: u8) -> NodeId {
        NodeId::new(Ipv4Addr::new(127, 0, 0, last_octet), 5000)
    }

    fn store() -> TopologyStore {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        let seed: Graph = BTreeMap::from([
            (a, BTreeMap::from([(b, 1), (c, 4)])),
            (b, BTreeMap::from([(a, 1), (c, 2)])),
            (c, BTreeMap::from([(a, 4), (b, 2)])),
        ]);
        TopologyStore::from_seed(a, seed).expect("seed should load")
    }

    #[test]
    fn origination_numbers_increase_and_filter_down_edges() {
        let mut engine = LinkStateEngine::new();
        let mut topo = store();

        let first = engine.originate(&mut topo);
        assert_eq!(first.seq_no, 1);
        assert_eq!(first.ttl, LSA_INITIAL_TTL);
        assert_eq!(first.links.len(), 2);

        topo.neighbor_lost(node(2));
        let second = engine.originate(&mut topo);
        assert_eq!(second.seq_no, 2);
        assert_eq!(second.links, BTreeMap::from([(node(3), 4)]));
    }

    #[test]
    fn own_echo_is_stale() {
        let mut engine = LinkStateEngine::new();
        let mut topo = store();
        let mut packet = engine.originate(&mut topo);
        packet.last_sender = node(2);
        packet.ttl -= 1;
        assert_eq!(engine.ingest(&mut topo, &packet), Ingest::Stale);
    }

    #[test]
    fn duplicate_sequence_is_dropped_everywhere() {
        let mut engine = LinkStateEngine::new();
        let mut topo = store();
        let packet = LinkStatePacket {
            src: node(2),
            last_sender: node(2),
            seq_no: 5,
            ttl: 15,
            links: BTreeMap::from([(node(1), 1), (node(3), 2)]),
        };
        assert!(matches!(
            engine.ingest(&mut topo, &packet),
            Ingest::Fresh { .. }
        ));
        assert_eq!(engine.ingest(&mut topo, &packet), Ingest::Stale);
    }

    #[test]
    fn exhausted_ttl_suppresses_flood_but_not_ingestion() {
        let mut engine = LinkStateEngine::new();
        let mut topo = store();
        let packet = LinkStatePacket {
            src: node(2),
            last_sender: node(3),
            seq_no: 1,
            ttl: 0,
            links: BTreeMap::from([(node(1), 1)]),
        };
        let outcome = engine.ingest(&mut topo, &packet);
        assert_eq!(
            outcome,
            Ingest::Fresh {
                changed: true,
                flood: false
            }
        );
    }

    #[test]
    fn flood_targets_apply_split_horizon() {
        let engine = LinkStateEngine::new();
        let topo = store();
        assert_eq!(
            engine.flood_targets(&topo, Some(node(2))),
            vec![node(3)]
        );
        assert_eq!(
            engine.flood_targets(&topo, None),
            vec![node(2), node(3)]
        );
    }
}
