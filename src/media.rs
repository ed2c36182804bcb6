//! Static media: content-addressed image storage plus the HTTP server that
//! hands the files to clients.
//!
//! The HTTP side runs on its own thread with its own actix runtime so the
//! blocking protocol server never waits on it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use actix_web::{web, App, HttpResponse, HttpServer};
use log::{error, info};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ServerError;
use crate::store;

/// Owns the images directory and knows how filenames become URLs.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    base_url: String,
}

impl ImageStore {
    pub fn new(dir: &Path, base_url: String) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(ImageStore {
            dir: dir.to_path_buf(),
            base_url,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), filename)
    }

    /// Stores `bytes` content-addressed: identical bytes always resolve to
    /// the already-registered file. Returns the public URL.
    pub fn save(
        &self,
        conn: &Connection,
        bytes: &[u8],
        name_hint: Option<&str>,
    ) -> Result<String, ServerError> {
        let hash = format!("{:x}", Sha256::digest(bytes));
        if let Some(existing) = store::image_by_hash(conn, &hash)? {
            return Ok(self.url_for(&existing));
        }

        let ext = name_hint
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("png");
        let filename = format!("{}.{}", Uuid::new_v4(), ext);

        let path = self.dir.join(&filename);
        std::fs::write(&path, bytes).map_err(|e| ServerError::Storage(e.to_string()))?;

        if let Err(e) = store::insert_image(conn, &filename, &hash) {
            // Lost a race on content_hash: another connection registered the
            // same bytes between our lookup and insert. Drop our copy and
            // answer with theirs.
            let _ = std::fs::remove_file(&path);
            if let Some(existing) = store::image_by_hash(conn, &hash)? {
                return Ok(self.url_for(&existing));
            }
            return Err(e);
        }
        Ok(self.url_for(&filename))
    }
}

/// Running static file server. Dropping the handle leaves the server up;
/// call `stop` for an orderly shutdown.
pub struct StaticServer {
    addr: SocketAddr,
    handle: actix_web::dev::ServerHandle,
    thread: JoinHandle<()>,
}

impl StaticServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(self) {
        actix_rt::System::new().block_on(self.handle.stop(true));
        let _ = self.thread.join();
    }
}

/// Serves `GET /images/<filename>` from `dir` on `host:port` (port 0 picks a
/// free one). No authentication: trusted-LAN deployment.
pub fn spawn_static_server(dir: &Path, host: &str, port: u16) -> anyhow::Result<StaticServer> {
    std::fs::create_dir_all(dir)?;
    let dir = dir.to_path_buf();
    let bind = (host.to_string(), port);

    let (tx, rx) = mpsc::channel::<std::io::Result<(SocketAddr, actix_web::dev::ServerHandle)>>();
    let thread = std::thread::Builder::new()
        .name("static-media".to_string())
        .spawn(move || {
            let system = actix_rt::System::new();
            system.block_on(async move {
                let data = web::Data::new(dir);
                let bound = HttpServer::new(move || {
                    App::new()
                        .app_data(data.clone())
                        .route("/images/{filename}", web::get().to(serve_image))
                })
                .workers(1)
                .bind(bind);
                let bound = match bound {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                let addr = bound.addrs()[0];
                let server = bound.run();
                let _ = tx.send(Ok((addr, server.handle())));
                if let Err(e) = server.await {
                    error!("static media server stopped: {e}");
                }
            });
        })?;

    let (addr, handle) = rx.recv()??;
    info!("static media server listening on http://{addr}");
    Ok(StaticServer {
        addr,
        handle,
        thread,
    })
}

async fn serve_image(path: web::Path<String>, dir: web::Data<PathBuf>) -> HttpResponse {
    let filename = path.into_inner();
    // One path component only; anything resembling traversal is a 404.
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return HttpResponse::NotFound().finish();
    }
    match std::fs::read(dir.join(&filename)) {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(content_type_for(&filename))
            .body(bytes),
        Err(_) => HttpResponse::NotFound().finish(),
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
