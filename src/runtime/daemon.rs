use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::model::node::NodeId;
use crate::model::routing::ForwardingTable;
use crate::model::topology::TopologyStore;
use crate::protocols::hello::NeighborMonitor;
use crate::protocols::link_state::{Ingest, LinkStateEngine};
use crate::protocols::route_compute::build_forwarding;
use crate::runtime::config::{find_local_node, load_topology, validate_port, EmulatorConfig};
use crate::runtime::mgmt::{DaemonSnapshot, FibSnapshot, NeighborSnapshot, StatusServer};
use crate::runtime::transport::UdpTransport;
use crate::wire::{
    encode_hello, encode_lsa, encode_trace, parse_packet, patch_lsa_for_flood, patch_trace_ttl,
    DataPacket, HelloPacket, LinkStatePacket, Packet, RouteTracePacket, TRACE_REPLY_TTL,
};

/// What one received datagram did to this node.
#[derive(Debug, Default, Clone, Copy)]
struct HandleOutcome {
    /// The live topology moved; the forwarding table must be rebuilt.
    topology_changed: bool,
    /// The local adjacency itself moved; an LSA must be originated now.
    local_changed: bool,
}

/// One emulator node: a single-threaded dispatcher interleaving a
/// bounded-wait receive with the HELLO/LSA timers. All state transitions
/// happen between datagram receipts, so nothing here needs a lock.
pub struct EmulatorDaemon {
    local: NodeId,
    transport: UdpTransport,
    store: TopologyStore,
    monitor: NeighborMonitor,
    engine: LinkStateEngine,
    forwarding: ForwardingTable,
    status: Option<StatusServer>,
    running: Arc<AtomicBool>,
    epoch: Instant,
}

impl EmulatorDaemon {
    pub fn new(cfg: EmulatorConfig) -> Result<Self> {
        validate_port(cfg.port)?;
        let seed = load_topology(&cfg.topology_file)?;
        let local = find_local_node(&seed, cfg.port)?;
        let transport = UdpTransport::bind(cfg.port)
            .with_context(|| format!("failed to bind UDP port {}", cfg.port))?;
        let store = TopologyStore::from_seed(local, seed)?;
        let monitor = NeighborMonitor::new(&store.neighbors(), 0.0, cfg.timers);

        let mut daemon = Self {
            local,
            transport,
            store,
            monitor,
            engine: LinkStateEngine::new(),
            forwarding: ForwardingTable::default(),
            status: None,
            running: Arc::new(AtomicBool::new(true)),
            epoch: Instant::now(),
        };

        if let Some(port) = cfg.status_port {
            let initial = daemon.snapshot(0.0);
            daemon.status = Some(StatusServer::start(initial, port)?);
        }

        // The fully-up seed graph yields the boot forwarding table; later
        // rebuilds are driven by confirmed changes.
        daemon.rebuild_forwarding();
        Ok(daemon)
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    pub fn forwarding_entries(&self) -> Vec<(NodeId, NodeId)> {
        self.forwarding.entries().map(|(d, h)| (*d, *h)).collect()
    }

    pub fn run_forever(&mut self) -> Result<()> {
        self.install_signal_handlers()?;

        info!(
            "emulator start: node={} neighbors={:?}",
            self.local,
            self.store
                .neighbors()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        );

        while self.running.load(Ordering::Relaxed) {
            let now = self.now_secs();
            let timeout = Duration::from_secs_f64(
                self.monitor.next_deadline_in(now).clamp(0.001, 0.05),
            );
            self.poll_once(timeout);
        }

        info!("emulator stopped");
        Ok(())
    }

    fn install_signal_handlers(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })?;
        Ok(())
    }

    /// One dispatcher iteration: at most one datagram, then timers, then at
    /// most one forwarding-table rebuild. Handler failures are logged and
    /// never tear the loop down.
    pub fn poll_once(&mut self, timeout: Duration) {
        let mut outcome = HandleOutcome::default();

        match self.transport.recv(timeout) {
            Ok(Some((mut buf, addr))) => match self.handle_datagram(&mut buf, addr) {
                Ok(got) => outcome = got,
                Err(err) => warn!("datagram handling failed: {err:#}"),
            },
            Ok(None) => {}
            Err(err) => warn!("receive failure: {err}"),
        }

        let now = self.now_secs();

        let down_interval = self.monitor.timers().down_interval;
        for neighbor in self.monitor.expired(now) {
            if self.store.neighbor_lost(neighbor) {
                info!("neighbor {neighbor} down: no hello for {down_interval:.1}s");
                outcome.topology_changed = true;
                outcome.local_changed = true;
            }
        }

        if self.monitor.hello_due(now) {
            self.send_hellos();
        }

        // A local adjacency change floods immediately; otherwise the
        // periodic origination keeps peers refreshed.
        if outcome.local_changed || self.monitor.lsa_due(now) {
            self.originate_lsa(now);
        }

        if outcome.topology_changed {
            self.rebuild_forwarding();
        }
    }

    fn handle_datagram(&mut self, buf: &mut [u8], addr: SocketAddr) -> Result<HandleOutcome> {
        let packet = match parse_packet(buf) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("drop undecodable datagram from {addr}: {err}");
                return Ok(HandleOutcome::default());
            }
        };

        match packet {
            Packet::Hello(hello) => Ok(self.on_hello(hello)),
            Packet::LinkState(lsa) => Ok(self.on_lsa(lsa, buf)),
            Packet::Trace(trace) => {
                self.on_trace(trace, buf);
                Ok(HandleOutcome::default())
            }
            Packet::Data(data) => {
                self.forward_data(data, buf);
                Ok(HandleOutcome::default())
            }
        }
    }

    fn on_hello(&mut self, hello: HelloPacket) -> HandleOutcome {
        if !self.store.is_neighbor(hello.src) {
            debug!("drop hello from non-neighbor {}", hello.src);
            return HandleOutcome::default();
        }
        let now = self.now_secs();
        self.monitor.record_hello(hello.src, now);
        if self.store.neighbor_recovered(hello.src) {
            info!("neighbor {} back up", hello.src);
            return HandleOutcome {
                topology_changed: true,
                local_changed: true,
            };
        }
        HandleOutcome::default()
    }

    fn on_lsa(&mut self, lsa: LinkStatePacket, buf: &mut [u8]) -> HandleOutcome {
        match self.engine.ingest(&mut self.store, &lsa) {
            Ingest::Stale => {
                debug!(
                    "drop stale lsa from {} seq={} via {}",
                    lsa.src, lsa.seq_no, lsa.last_sender
                );
                HandleOutcome::default()
            }
            Ingest::Fresh { changed, flood } => {
                if flood {
                    patch_lsa_for_flood(buf, self.local, lsa.ttl - 1);
                    for target in self.engine.flood_targets(&self.store, Some(lsa.last_sender)) {
                        self.send_to(buf, target);
                    }
                }
                HandleOutcome {
                    topology_changed: changed,
                    local_changed: false,
                }
            }
        }
    }

    fn on_trace(&mut self, trace: RouteTracePacket, buf: &mut [u8]) {
        if trace.reply {
            if trace.dest == self.local {
                // End of the return path: hand the reply to the trace client.
                self.send_to_addr(buf, trace.trace.socket_addr());
            } else {
                self.forward_toward(buf, trace.dest, "trace reply");
            }
            return;
        }

        if trace.dest == self.local || trace.ttl == 0 {
            self.send_trace_reply(&trace);
            return;
        }

        patch_trace_ttl(buf, trace.ttl - 1);
        self.forward_toward(buf, trace.dest, "trace request");
    }

    /// Synthesizes the `O` for a trace request that terminated here, either
    /// because this node is the probe's destination or because its TTL
    /// expired, and routes it back toward the originating emulator.
    fn send_trace_reply(&mut self, request: &RouteTracePacket) {
        let reply = RouteTracePacket {
            reply: true,
            src: self.local,
            dest: request.src,
            trace: request.trace,
            ttl: TRACE_REPLY_TTL,
        };
        let buf = encode_trace(&reply);
        if reply.dest == self.local {
            // The probe was answered by the source emulator itself.
            self.send_to_addr(&buf, reply.trace.socket_addr());
        } else {
            self.forward_toward(&buf, reply.dest, "trace reply");
        }
    }

    fn forward_data(&mut self, data: DataPacket, buf: &[u8]) {
        self.forward_toward(buf, data.dest, "data");
    }

    fn forward_toward(&mut self, buf: &[u8], dest: NodeId, what: &str) {
        match self.forwarding.next_hop(dest) {
            Some(hop) => self.send_to(buf, hop),
            None => debug!("drop {what} for {dest}: no route"),
        }
    }

    fn send_hellos(&mut self) {
        let buf = encode_hello(self.local);
        // Down neighbors are beaconed too; hearing our HELLO is how a
        // restarted neighbor learns we are still here.
        for neighbor in self.store.neighbors() {
            self.send_to(&buf, neighbor);
        }
    }

    fn originate_lsa(&mut self, now: f64) {
        let packet = self.engine.originate(&mut self.store);
        self.monitor.mark_lsa_sent(now);
        let buf = encode_lsa(&packet);
        for target in self.engine.flood_targets(&self.store, None) {
            self.send_to(&buf, target);
        }
    }

    fn rebuild_forwarding(&mut self) {
        let next = build_forwarding(self.store.live(), self.local);
        self.forwarding.replace(next);
        self.print_report();
        self.publish_snapshot();
    }

    /// The mandated stdout report, emitted on every rebuild.
    fn print_report(&self) {
        println!("Topology:\n");
        println!("{}\n", self.store.render());
        println!("Forwarding Table:\n");
        println!("{}", self.forwarding.render());
    }

    fn send_to(&self, buf: &[u8], dest: NodeId) {
        if let Err(err) = self.transport.send(buf, dest) {
            warn!("send to {dest} failed: {err}");
        }
    }

    fn send_to_addr(&self, buf: &[u8], dest: SocketAddr) {
        if let Err(err) = self.transport.send_addr(buf, dest) {
            warn!("send to {dest} failed: {err}");
        }
    }

    fn publish_snapshot(&self) {
        if let Some(status) = &self.status {
            status.publish(self.snapshot(self.now_secs()));
        }
    }

    fn snapshot(&self, now: f64) -> DaemonSnapshot {
        let neighbors = self
            .store
            .neighbors()
            .into_iter()
            .map(|n| NeighborSnapshot {
                node: n.to_string(),
                cost: self.store.neighbor_cost(n).unwrap_or_default(),
                is_up: self.store.is_up(n),
                last_hello_at: self.monitor.last_hello_at(n).unwrap_or_default(),
            })
            .collect();
        let fib = self
            .forwarding
            .entries()
            .map(|(dest, hop)| FibSnapshot {
                destination: dest.to_string(),
                next_hop: hop.to_string(),
            })
            .collect();
        DaemonSnapshot {
            node: self.local.to_string(),
            now,
            neighbors,
            fib,
        }
    }

    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
