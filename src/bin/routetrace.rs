use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{bail, Context, Result};
use clap::Parser;
use lsr::model::node::NodeId;
use lsr::runtime::config::validate_port;
use lsr::wire::{encode_trace, parse_packet, Packet, RouteTracePacket, MAX_DATAGRAM};

/// Probe budget: the longest path the tracer will enumerate.
const MAX_HOPS: u32 = 20;

#[derive(Debug, Parser)]
#[command(name = "routetrace")]
#[command(about = "TTL-scanning path tracer for the routing emulator")]
struct Args {
    /// Local UDP port trace replies arrive on.
    #[arg(short = 'a', long = "routetrace_port")]
    routetrace_port: u16,
    /// Emulator the probes are handed to.
    #[arg(short = 'b', long = "source_hostname")]
    source_hostname: String,
    #[arg(short = 'c', long = "source_port")]
    source_port: u16,
    /// Emulator the path is traced toward.
    #[arg(short = 'd', long = "destination_hostname")]
    destination_hostname: String,
    #[arg(short = 'e', long = "destination_port")]
    destination_port: u16,
    /// 1 prints per-packet detail.
    #[arg(short = 'f', long = "debug_option")]
    debug_option: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    validate_port(args.routetrace_port)?;

    let source = resolve(&args.source_hostname, args.source_port)?;
    let dest = resolve(&args.destination_hostname, args.destination_port)?;
    let trace = NodeId::new(local_ip_toward(source)?, args.routetrace_port);

    let recv_sock = UdpSocket::bind(("0.0.0.0", args.routetrace_port))
        .with_context(|| format!("failed to bind trace port {}", args.routetrace_port))?;
    let send_sock = UdpSocket::bind(("0.0.0.0", 0)).context("failed to open send socket")?;

    let debug = args.debug_option != 0;
    if debug {
        println!("Hop# SRCIP SRCPort DESTIP DESTPort");
    } else {
        println!("Hop#  IP Port");
    }

    let mut buf = [0_u8; MAX_DATAGRAM];
    for ttl in 0..MAX_HOPS {
        let probe = RouteTracePacket {
            reply: false,
            src: source,
            dest,
            trace,
            ttl,
        };
        send_sock
            .send_to(&encode_trace(&probe), source.socket_addr())
            .with_context(|| format!("failed to send probe to {source}"))?;
        if debug {
            println!("sent: ttl={ttl} src={source} dest={dest}");
        }

        let (n, _) = recv_sock
            .recv_from(&mut buf)
            .context("failed to receive trace reply")?;
        let Ok(Packet::Trace(reply)) = parse_packet(&buf[..n]) else {
            continue;
        };
        if !reply.reply {
            continue;
        }

        let hop = ttl + 1;
        if debug {
            println!(
                "{hop} {} {} {} {}",
                reply.src.ip, reply.src.port, reply.dest.ip, reply.dest.port
            );
        } else {
            println!("{hop} {} {}", reply.src.ip, reply.src.port);
        }

        if reply.src == dest {
            break;
        }
    }
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<NodeId> {
    let addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {host}:{port}"))?;
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            return Ok(NodeId::new(*v4.ip(), port));
        }
    }
    bail!("no IPv4 address for {host}")
}

/// The IPv4 address emulators should reply to, learned by connecting a
/// throwaway socket toward the source emulator and reading the chosen
/// local address.
fn local_ip_toward(target: NodeId) -> Result<Ipv4Addr> {
    let probe = UdpSocket::bind(("0.0.0.0", 0)).context("failed to open probe socket")?;
    probe
        .connect(target.socket_addr())
        .with_context(|| format!("no route toward {target}"))?;
    match probe.local_addr().context("probe socket has no address")? {
        SocketAddr::V4(v4) => Ok(*v4.ip()),
        other => bail!("unexpected local address family: {other}"),
    }
}
