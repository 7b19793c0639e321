use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::model::node::NodeId;
use crate::wire::MAX_DATAGRAM;

/// The dispatcher's two UDP endpoints: a bound receive socket and an unbound
/// send socket. Receiving is bounded-wait; `Ok(None)` means no datagram
/// arrived before the timeout, never an error.
pub struct UdpTransport {
    recv_sock: UdpSocket,
    send_sock: UdpSocket,
}

impl UdpTransport {
    pub fn bind(port: u16) -> io::Result<Self> {
        let recv_sock = UdpSocket::bind(("0.0.0.0", port))?;
        let send_sock = UdpSocket::bind(("0.0.0.0", 0))?;
        Ok(Self {
            recv_sock,
            send_sock,
        })
    }

    pub fn recv(&self, timeout: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        self.recv_sock
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buf = vec![0_u8; MAX_DATAGRAM];
        match self.recv_sock.recv_from(&mut buf) {
            Ok((n, addr)) => {
                buf.truncate(n);
                Ok(Some((buf, addr)))
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn send(&self, payload: &[u8], dest: NodeId) -> io::Result<usize> {
        self.send_sock.send_to(payload, dest.socket_addr())
    }

    pub fn send_addr(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.send_sock.send_to(payload, dest)
    }
}
