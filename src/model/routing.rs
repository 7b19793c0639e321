use std::collections::BTreeMap;

use crate::model::node::NodeId;

/// Destination → next-hop table, replaced wholesale on every rebuild so the
/// dispatcher never observes a partially updated view.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: BTreeMap<NodeId, NodeId>,
}

impl ForwardingTable {
    pub fn replace(&mut self, next: BTreeMap<NodeId, NodeId>) -> bool {
        if next == self.entries {
            return false;
        }
        self.entries = next;
        true
    }

    pub fn next_hop(&self, dest: NodeId) -> Option<NodeId> {
        self.entries.get(&dest).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.entries.iter()
    }

    /// One line per destination: `dest next-hop`.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(dest, hop)| format!("{dest} {hop}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn node(last_octet: u8) -> NodeId {
        NodeId::new(Ipv4Addr::new(127, 0, 0, last_octet), 5000)
    }

    #[test]
    fn replace_reports_change_only_on_difference() {
        let mut table = ForwardingTable::default();
        let next = BTreeMap::from([(node(2), node(2)), (node(3), node(2))]);
        assert!(table.replace(next.clone()));
        assert!(!table.replace(next));
        assert!(table.replace(BTreeMap::new()));
        assert!(table.is_empty());
    }

    #[test]
    fn lookup_and_render() {
        let mut table = ForwardingTable::default();
        table.replace(BTreeMap::from([(node(3), node(2))]));
        assert_eq!(table.next_hop(node(3)), Some(node(2)));
        assert_eq!(table.next_hop(node(9)), None);
        assert_eq!(table.render(), "127.0.0.3,5000 127.0.0.2,5000");
    }
}
