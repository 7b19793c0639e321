use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::model::node::NodeId;

/// Largest datagram any emulator sends or accepts.
pub const MAX_DATAGRAM: usize = 4096;

/// TTL carried by a freshly originated link-state advertisement.
pub const LSA_INITIAL_TTL: u32 = 15;

/// TTL carried by a synthesized route-trace reply.
pub const TRACE_REPLY_TTL: u32 = 19;

pub const TAG_HELLO: u8 = b'H';
pub const TAG_LSA: u8 = b'L';
pub const TAG_TRACE_REPLY: u8 = b'O';
pub const TAG_TRACE_REQUEST: u8 = b'T';

/// Tags below this value classify the datagram as opaque data traffic.
pub const DATA_TAG_LIMIT: u8 = 0x04;

const NODE_LEN: usize = 6;
const HELLO_LEN: usize = 1 + NODE_LEN;
const LSA_HEADER_LEN: usize = 1 + 2 * NODE_LEN + 12;
const TRACE_LEN: usize = 1 + 3 * NODE_LEN + 4;
const DATA_HEADER_LEN: usize = 1 + 2 * NODE_LEN;
const ADJ_RECORD_LEN: usize = 10;

const LSA_SENDER_OFFSET: usize = 7;
const LSA_SEQ_OFFSET: usize = 13;
const LSA_TTL_OFFSET: usize = 17;
const LSA_LEN_OFFSET: usize = 21;
const TRACE_TTL_OFFSET: usize = 19;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram too short: {0} bytes")]
    Short(usize),
    #[error("unknown packet tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("truncated payload: header claims {claimed} bytes, {actual} present")]
    Truncated { claimed: usize, actual: usize },
    #[error("adjacency payload length {0} is not a multiple of {ADJ_RECORD_LEN}")]
    BadAdjacency(usize),
    #[error("datagram exceeds {MAX_DATAGRAM} bytes: {0}")]
    Oversized(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloPacket {
    pub src: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatePacket {
    pub src: NodeId,
    pub last_sender: NodeId,
    pub seq_no: u32,
    pub ttl: u32,
    pub links: BTreeMap<NodeId, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTracePacket {
    pub reply: bool,
    pub src: NodeId,
    pub dest: NodeId,
    pub trace: NodeId,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPacket {
    pub src: NodeId,
    pub dest: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Hello(HelloPacket),
    LinkState(LinkStatePacket),
    Trace(RouteTracePacket),
    Data(DataPacket),
}

/// Classifies and parses one datagram. All multi-byte fields are big-endian.
pub fn parse_packet(buf: &[u8]) -> Result<Packet, DecodeError> {
    if buf.len() > MAX_DATAGRAM {
        return Err(DecodeError::Oversized(buf.len()));
    }
    let Some(&tag) = buf.first() else {
        return Err(DecodeError::Short(0));
    };

    if tag < DATA_TAG_LIMIT {
        if buf.len() < DATA_HEADER_LEN {
            return Err(DecodeError::Short(buf.len()));
        }
        return Ok(Packet::Data(DataPacket {
            src: read_node(buf, 1),
            dest: read_node(buf, 7),
        }));
    }

    match tag {
        TAG_HELLO => {
            if buf.len() < HELLO_LEN {
                return Err(DecodeError::Short(buf.len()));
            }
            Ok(Packet::Hello(HelloPacket {
                src: read_node(buf, 1),
            }))
        }
        TAG_LSA => {
            if buf.len() < LSA_HEADER_LEN {
                return Err(DecodeError::Short(buf.len()));
            }
            let payload_len = read_u32(buf, LSA_LEN_OFFSET) as usize;
            let claimed = LSA_HEADER_LEN + payload_len;
            if buf.len() < claimed {
                return Err(DecodeError::Truncated {
                    claimed,
                    actual: buf.len(),
                });
            }
            let links = decode_adjacency(&buf[LSA_HEADER_LEN..claimed])?;
            Ok(Packet::LinkState(LinkStatePacket {
                src: read_node(buf, 1),
                last_sender: read_node(buf, LSA_SENDER_OFFSET),
                seq_no: read_u32(buf, LSA_SEQ_OFFSET),
                ttl: read_u32(buf, LSA_TTL_OFFSET),
                links,
            }))
        }
        TAG_TRACE_REQUEST | TAG_TRACE_REPLY => {
            if buf.len() < TRACE_LEN {
                return Err(DecodeError::Short(buf.len()));
            }
            Ok(Packet::Trace(RouteTracePacket {
                reply: tag == TAG_TRACE_REPLY,
                src: read_node(buf, 1),
                dest: read_node(buf, 7),
                trace: read_node(buf, 13),
                ttl: read_u32(buf, TRACE_TTL_OFFSET),
            }))
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

pub fn encode_hello(src: NodeId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HELLO_LEN);
    buf.push(TAG_HELLO);
    put_node(&mut buf, src);
    buf
}

pub fn encode_lsa(packet: &LinkStatePacket) -> Vec<u8> {
    let payload = encode_adjacency(&packet.links);
    let mut buf = Vec::with_capacity(LSA_HEADER_LEN + payload.len());
    buf.push(TAG_LSA);
    put_node(&mut buf, packet.src);
    put_node(&mut buf, packet.last_sender);
    buf.extend_from_slice(&packet.seq_no.to_be_bytes());
    buf.extend_from_slice(&packet.ttl.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

pub fn encode_trace(packet: &RouteTracePacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TRACE_LEN);
    buf.push(if packet.reply {
        TAG_TRACE_REPLY
    } else {
        TAG_TRACE_REQUEST
    });
    put_node(&mut buf, packet.src);
    put_node(&mut buf, packet.dest);
    put_node(&mut buf, packet.trace);
    buf.extend_from_slice(&packet.ttl.to_be_bytes());
    buf
}

pub fn encode_data(tag: u8, src: NodeId, dest: NodeId, payload: &[u8]) -> Vec<u8> {
    debug_assert!(tag < DATA_TAG_LIMIT);
    let mut buf = Vec::with_capacity(DATA_HEADER_LEN + payload.len());
    buf.push(tag);
    put_node(&mut buf, src);
    put_node(&mut buf, dest);
    buf.extend_from_slice(payload);
    buf
}

/// Rewrites the mutable LSA header fields in place before re-flooding,
/// leaving `src`, `seqNo`, and the payload bytes untouched.
pub fn patch_lsa_for_flood(buf: &mut [u8], sender: NodeId, ttl: u32) {
    write_node(buf, LSA_SENDER_OFFSET, sender);
    buf[LSA_TTL_OFFSET..LSA_TTL_OFFSET + 4].copy_from_slice(&ttl.to_be_bytes());
}

/// Rewrites the TTL of a route-trace datagram in place before forwarding.
pub fn patch_trace_ttl(buf: &mut [u8], ttl: u32) {
    buf[TRACE_TTL_OFFSET..TRACE_TTL_OFFSET + 4].copy_from_slice(&ttl.to_be_bytes());
}

/// Canonical adjacency encoding: consecutive `ip(4) port(2) cost(4)` records
/// sorted ascending by node, so identical maps encode to identical bytes on
/// every peer.
fn encode_adjacency(links: &BTreeMap<NodeId, u32>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(links.len() * ADJ_RECORD_LEN);
    for (node, cost) in links {
        put_node(&mut buf, *node);
        buf.extend_from_slice(&cost.to_be_bytes());
    }
    buf
}

fn decode_adjacency(payload: &[u8]) -> Result<BTreeMap<NodeId, u32>, DecodeError> {
    if payload.len() % ADJ_RECORD_LEN != 0 {
        return Err(DecodeError::BadAdjacency(payload.len()));
    }
    let mut links = BTreeMap::new();
    for record in payload.chunks_exact(ADJ_RECORD_LEN) {
        links.insert(read_node(record, 0), read_u32(record, NODE_LEN));
    }
    Ok(links)
}

fn read_node(buf: &[u8], offset: usize) -> NodeId {
    let ip = Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]);
    let port = u16::from_be_bytes([buf[offset + 4], buf[offset + 5]]);
    NodeId::new(ip, port)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn put_node(buf: &mut Vec<u8>, node: NodeId) {
    buf.extend_from_slice(&node.ip.octets());
    buf.extend_from_slice(&node.port.to_be_bytes());
}

fn write_node(buf: &mut [u8], offset: usize, node: NodeId) {
    buf[offset..offset + 4].copy_from_slice(&node.ip.octets());
    buf[offset + 4..offset + 6].copy_from_slice(&node.port.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(last_octet: u8, port: u16) -> NodeId {
        NodeId::new(Ipv4Addr::new(10, 0, 0, last_octet), port)
    }

    #[test]
    fn hello_roundtrip_and_layout() {
        let src = node(1, 5000);
        let buf = encode_hello(src);
        assert_eq!(buf.len(), 7);
        assert_eq!(buf[0], b'H');
        assert_eq!(&buf[1..5], &[10, 0, 0, 1]);
        assert_eq!(&buf[5..7], &5000_u16.to_be_bytes());

        let parsed = parse_packet(&buf).expect("hello should parse");
        assert_eq!(parsed, Packet::Hello(HelloPacket { src }));
    }

    #[test]
    fn lsa_roundtrip_preserves_fields_and_links() {
        let mut links = BTreeMap::new();
        links.insert(node(2, 5001), 1);
        links.insert(node(3, 5002), 7);
        let packet = LinkStatePacket {
            src: node(1, 5000),
            last_sender: node(1, 5000),
            seq_no: 42,
            ttl: LSA_INITIAL_TTL,
            links,
        };

        let buf = encode_lsa(&packet);
        assert_eq!(buf[0], b'L');
        assert_eq!(buf.len(), 25 + 20);
        assert_eq!(&buf[13..17], &42_u32.to_be_bytes());
        assert_eq!(&buf[17..21], &LSA_INITIAL_TTL.to_be_bytes());
        assert_eq!(&buf[21..25], &20_u32.to_be_bytes());

        match parse_packet(&buf).expect("lsa should parse") {
            Packet::LinkState(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected LSA, got {other:?}"),
        }
    }

    #[test]
    fn lsa_payload_encoding_is_sorted_and_stable() {
        let mut forward = BTreeMap::new();
        forward.insert(node(9, 5009), 3);
        forward.insert(node(2, 5001), 1);
        let packet = LinkStatePacket {
            src: node(1, 5000),
            last_sender: node(1, 5000),
            seq_no: 1,
            ttl: 15,
            links: forward,
        };
        let buf = encode_lsa(&packet);
        // First record is the lower node regardless of insertion order.
        assert_eq!(&buf[25..29], &[10, 0, 0, 2]);
        assert_eq!(&buf[35..39], &[10, 0, 0, 9]);
    }

    #[test]
    fn trace_roundtrip_both_tags() {
        let packet = RouteTracePacket {
            reply: false,
            src: node(1, 5000),
            dest: node(4, 5003),
            trace: node(9, 7000),
            ttl: 0,
        };
        let buf = encode_trace(&packet);
        assert_eq!(buf.len(), 23);
        assert_eq!(buf[0], b'T');
        assert_eq!(parse_packet(&buf).unwrap(), Packet::Trace(packet));

        let reply = RouteTracePacket {
            reply: true,
            ttl: TRACE_REPLY_TTL,
            ..packet
        };
        let buf = encode_trace(&reply);
        assert_eq!(buf[0], b'O');
        assert_eq!(&buf[19..23], &TRACE_REPLY_TTL.to_be_bytes());
        assert_eq!(parse_packet(&buf).unwrap(), Packet::Trace(reply));
    }

    #[test]
    fn data_tags_below_limit_classify_as_data() {
        for tag in 0..DATA_TAG_LIMIT {
            let buf = encode_data(tag, node(1, 5000), node(2, 5001), b"payload");
            match parse_packet(&buf).expect("data should parse") {
                Packet::Data(data) => {
                    assert_eq!(data.src, node(1, 5000));
                    assert_eq!(data.dest, node(2, 5001));
                }
                other => panic!("expected data, got {other:?}"),
            }
        }
    }

    #[test]
    fn short_and_unknown_datagrams_are_rejected() {
        assert_eq!(parse_packet(&[]), Err(DecodeError::Short(0)));
        assert_eq!(parse_packet(&[b'H', 10, 0]), Err(DecodeError::Short(3)));
        assert_eq!(parse_packet(&[0x7f; 8]), Err(DecodeError::UnknownTag(0x7f)));
    }

    #[test]
    fn truncated_lsa_payload_is_rejected() {
        let mut links = BTreeMap::new();
        links.insert(node(2, 5001), 1);
        let packet = LinkStatePacket {
            src: node(1, 5000),
            last_sender: node(1, 5000),
            seq_no: 1,
            ttl: 15,
            links,
        };
        let buf = encode_lsa(&packet);
        assert_eq!(
            parse_packet(&buf[..buf.len() - 3]),
            Err(DecodeError::Truncated {
                claimed: 35,
                actual: 32
            })
        );
    }

    #[test]
    fn ragged_adjacency_length_is_rejected() {
        let packet = LinkStatePacket {
            src: node(1, 5000),
            last_sender: node(1, 5000),
            seq_no: 1,
            ttl: 15,
            links: BTreeMap::new(),
        };
        let mut buf = encode_lsa(&packet);
        buf[21..25].copy_from_slice(&4_u32.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(parse_packet(&buf), Err(DecodeError::BadAdjacency(4)));
    }

    #[test]
    fn flood_patch_rewrites_sender_and_ttl_only() {
        let mut links = BTreeMap::new();
        links.insert(node(3, 5002), 2);
        let packet = LinkStatePacket {
            src: node(1, 5000),
            last_sender: node(1, 5000),
            seq_no: 9,
            ttl: 15,
            links: links.clone(),
        };
        let mut buf = encode_lsa(&packet);
        patch_lsa_for_flood(&mut buf, node(2, 5001), 14);

        match parse_packet(&buf).unwrap() {
            Packet::LinkState(patched) => {
                assert_eq!(patched.last_sender, node(2, 5001));
                assert_eq!(patched.ttl, 14);
                assert_eq!(patched.src, packet.src);
                assert_eq!(patched.seq_no, 9);
                assert_eq!(patched.links, links);
            }
            other => panic!("expected LSA, got {other:?}"),
        }
    }

    #[test]
    fn trace_patch_rewrites_ttl() {
        let packet = RouteTracePacket {
            reply: false,
            src: node(1, 5000),
            dest: node(4, 5003),
            trace: node(9, 7000),
            ttl: 5,
        };
        let mut buf = encode_trace(&packet);
        patch_trace_ttl(&mut buf, 4);
        match parse_packet(&buf).unwrap() {
            Packet::Trace(patched) => assert_eq!(patched.ttl, 4),
            other => panic!("expected trace, got {other:?}"),
        }
    }
}
