use std::collections::BTreeMap;
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::model::node::NodeId;
use crate::model::topology::Graph;
use crate::protocols::hello::Timers;

/// Lowest UDP port an emulator may bind; everything below is reserved for
/// well-known services in the assignment fabric.
pub const MIN_PORT: u16 = 2050;

#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub port: u16,
    pub topology_file: PathBuf,
    pub status_port: Option<u16>,
    pub timers: Timers,
}

pub fn validate_port(port: u16) -> Result<()> {
    if port < MIN_PORT {
        bail!("port {port} out of range ({MIN_PORT}-65535)");
    }
    Ok(())
}

/// Parses the seed topology file: one line per node, `IP,PORT` followed by
/// whitespace-separated `IP,PORT,COST` neighbor triples. The file is trusted
/// to be symmetric; an inconsistent file is the operator's problem.
pub fn load_topology(path: &Path) -> Result<Graph> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology file {}", path.display()))?;
    parse_topology(&text)
        .with_context(|| format!("malformed topology file {}", path.display()))
}

fn parse_topology(text: &str) -> Result<Graph> {
    let mut seed: Graph = BTreeMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let node: NodeId = first
            .parse()
            .with_context(|| format!("line {}: bad node", lineno + 1))?;

        let mut links = BTreeMap::new();
        for field in fields {
            let (neighbor, cost) = parse_link(field)
                .with_context(|| format!("line {}: bad neighbor triple {field:?}", lineno + 1))?;
            links.insert(neighbor, cost);
        }
        if seed.insert(node, links).is_some() {
            bail!("line {}: duplicate node {node}", lineno + 1);
        }
    }
    if seed.is_empty() {
        bail!("topology file lists no nodes");
    }
    Ok(seed)
}

fn parse_link(field: &str) -> Result<(NodeId, u32)> {
    let (node_raw, cost_raw) = field
        .rsplit_once(',')
        .ok_or_else(|| anyhow!("expected IP,PORT,COST"))?;
    let neighbor: NodeId = node_raw.parse()?;
    let cost = cost_raw
        .trim()
        .parse::<u32>()
        .with_context(|| format!("invalid cost {cost_raw:?}"))?;
    Ok((neighbor, cost))
}

/// Picks this instance's identity out of the seed: the node whose port
/// matches and whose address is assignable on this host. A throwaway bind
/// probe answers "is this one of my addresses" without guessing at
/// interfaces or hostnames.
pub fn find_local_node(seed: &Graph, port: u16) -> Result<NodeId> {
    let candidates: Vec<NodeId> = seed.keys().filter(|n| n.port == port).copied().collect();
    if candidates.is_empty() {
        bail!("no node with port {port} in the topology file");
    }
    for candidate in &candidates {
        if UdpSocket::bind((candidate.ip, 0)).is_ok() {
            return Ok(*candidate);
        }
    }
    bail!(
        "none of the port-{port} nodes resolve to a local address: {}",
        candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    )
}
