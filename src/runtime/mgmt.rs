use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct NeighborSnapshot {
    pub node: String,
    pub cost: u32,
    pub is_up: bool,
    pub last_hello_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FibSnapshot {
    pub destination: String,
    pub next_hop: String,
}

/// Point-in-time view of one emulator, published after every forwarding-table
/// rebuild and served as JSON by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonSnapshot {
    pub node: String,
    pub now: f64,
    pub neighbors: Vec<NeighborSnapshot>,
    pub fib: Vec<FibSnapshot>,
}

pub struct StatusServer {
    snapshot: Arc<RwLock<DaemonSnapshot>>,
}

impl StatusServer {
    pub fn start(initial: DaemonSnapshot, port: u16) -> Result<Self> {
        let snapshot = Arc::new(RwLock::new(initial));
        spawn_http_server(Arc::clone(&snapshot), port)?;
        info!("status endpoint listening on 0.0.0.0:{port}");
        Ok(Self { snapshot })
    }

    pub fn publish(&self, snapshot: DaemonSnapshot) {
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = snapshot;
        }
    }
}

fn spawn_http_server(snapshot: Arc<RwLock<DaemonSnapshot>>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .with_context(|| format!("failed to bind status endpoint at 0.0.0.0:{port}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to set status listener non-blocking")?;

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(err) = handle_http_stream(stream, &snapshot) {
                    debug!("status request failed: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(80));
            }
            Err(err) => {
                warn!("status endpoint accept error: {err}");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(())
}

fn handle_http_stream(mut stream: TcpStream, snapshot: &Arc<RwLock<DaemonSnapshot>>) -> Result<()> {
    let mut buf = [0_u8; 2048];
    let n = stream
        .read(&mut buf)
        .context("failed to read HTTP request from status socket")?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let first_line = request.lines().next().unwrap_or_default();
    let path = first_line.split_whitespace().nth(1).unwrap_or("/");

    let state = snapshot
        .read()
        .map_err(|_| anyhow::anyhow!("status snapshot lock poisoned"))?
        .clone();

    let (status_line, body) = match path {
        "/healthz" => ("HTTP/1.1 200 OK", json!({"status": "ok"})),
        "/v1/status" => (
            "HTTP/1.1 200 OK",
            serde_json::to_value(&state).unwrap_or_else(|_| json!({"status": "encode_error"})),
        ),
        "/v1/fib" => ("HTTP/1.1 200 OK", json!({"fib": state.fib})),
        _ => ("HTTP/1.1 404 Not Found", json!({"error": "not_found", "path": path})),
    };

    let payload = serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"error\":\"encode\"}".to_vec());
    let response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    stream
        .write_all(response.as_bytes())
        .context("failed to write HTTP headers")?;
    stream
        .write_all(&payload)
        .context("failed to write HTTP body")?;
    Ok(())
}
