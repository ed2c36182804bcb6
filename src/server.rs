//! The protocol server: accept loop, per-connection threads, and the one
//! piece of cross-connection shared state (the connection registry).

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::db;
use crate::dispatch;
use crate::error::ServerError;
use crate::media::ImageStore;
use crate::protocol::types::{Request, Response};
use crate::protocol::{read_frame, write_message};

/// Live-connection count plus the peer → display-name map filled in by
/// successful login/register. One mutex serializes every access; nothing
/// else is shared mutably across connections.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    connected: usize,
    usernames: HashMap<SocketAddr, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn client_connected(&self) -> usize {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.connected += 1;
        info!("clients connected: {}", inner.connected);
        inner.connected
    }

    /// Called by login/register once the peer has a human-readable identity.
    pub fn associate(&self, peer: SocketAddr, display_name: String) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.usernames.insert(peer, display_name);
    }

    /// Returns the remaining count and, when the peer had logged in, the
    /// display name for the disconnect notice.
    pub fn client_disconnected(&self, peer: SocketAddr) -> (usize, Option<String>) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.connected = inner.connected.saturating_sub(1);
        let name = inner.usernames.remove(&peer);
        (inner.connected, name)
    }

    pub fn connected(&self) -> usize {
        self.inner.lock().expect("registry lock").connected
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a connection thread needs. Handlers reach the database through
/// their own per-thread `Connection`; this holds only the path.
pub struct AppCtx {
    pub db_path: PathBuf,
    pub image_store: ImageStore,
    pub registry: ConnectionRegistry,
}

pub struct LabServer {
    listener: TcpListener,
    ctx: Arc<AppCtx>,
    shutdown: Arc<AtomicBool>,
}

impl LabServer {
    pub fn bind(addr: impl ToSocketAddrs, ctx: Arc<AppCtx>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(LabServer {
            listener,
            ctx,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Setting the flag makes `run` return after its next accept poll.
    /// Already-accepted connections drain on their own threads.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn ctx(&self) -> Arc<AppCtx> {
        self.ctx.clone()
    }

    /// Accept loop: one thread per connection. The listener polls so the
    /// shutdown flag is observed; accepted sockets get no read timeout, so a
    /// silent client occupies its thread until it disconnects. That is a
    /// known resource-exhaustion risk on a hostile network; this deployment
    /// trusts the LAN.
    pub fn run(self) -> anyhow::Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(
            "assessment server listening on {}",
            self.listener.local_addr()?
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown flag set, closing listener");
                return Ok(());
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let ctx = self.ctx.clone();
                    std::thread::Builder::new()
                        .name(format!("conn-{peer}"))
                        .spawn(move || handle_connection(stream, peer, ctx))?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("accept failed: {e}");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}

/// Per-connection request loop. Requests on one connection are strictly
/// sequential; exactly one response goes out per request. Only framing
/// failures end the loop early — a malformed JSON payload is answered with
/// an error envelope and the loop keeps reading.
fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<AppCtx>) {
    ctx.registry.client_connected();

    // The listener is non-blocking; the accepted socket must not be.
    if let Err(e) = stream.set_nonblocking(false) {
        error!("{peer}: socket setup failed: {e}");
        finish(&ctx, peer);
        return;
    }

    let conn = match db::open_db(&ctx.db_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{peer}: cannot open database: {e:#}");
            finish(&ctx, peer);
            return;
        }
    };

    let mut writer = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            error!("{peer}: socket clone failed: {e}");
            finish(&ctx, peer);
            return;
        }
    };
    let mut reader = BufReader::new(stream);

    loop {
        let payload = match read_frame(&mut reader) {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) => {
                warn!("{peer}: {}", ServerError::Framing(e));
                break;
            }
        };

        let response = match serde_json::from_slice::<Request>(&payload) {
            Ok(request) => {
                debug!("{peer}: action '{}'", request.action);
                dispatch::dispatch(&ctx, &conn, peer, request)
            }
            Err(e) => Response::from(&ServerError::Decode(e)),
        };

        if let Err(e) = write_message(&mut writer, &response) {
            warn!("{peer}: write failed: {e}");
            break;
        }
    }

    finish(&ctx, peer);
}

fn finish(ctx: &AppCtx, peer: SocketAddr) {
    let (remaining, name) = ctx.registry.client_disconnected(peer);
    match name {
        Some(fio) => info!("{fio} отключился"),
        None => info!("client disconnected: {peer}"),
    }
    info!("clients connected: {remaining}");
}
