//! Client-side request/response exchange.
//!
//! Every GUI screen funnels its traffic through one of these: a request goes
//! out, exactly one response comes back, and the caller decides what to do
//! with an error. Timeouts are short and client-side only.

use std::io::BufReader;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use crate::protocol::frame::{read_frame, write_message, FramingError};
use crate::protocol::types::{Request, Response};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {0}: {1}")]
    Connect(String, #[source] std::io::Error),

    #[error("framing: {0}")]
    Framing(#[from] FramingError),

    #[error("server sent an unparseable response: {0}")]
    BadResponse(#[source] serde_json::Error),

    #[error("server closed the connection without responding")]
    Closed,
}

/// One-shot worker: opens a connection, performs a single exchange, closes.
/// This is how the GUI screens talk to the server.
#[derive(Debug, Clone)]
pub struct RequestWorker {
    server: String,
    timeout: Duration,
}

impl RequestWorker {
    pub fn new(host: &str, port: u16) -> Self {
        RequestWorker {
            server: format!("{host}:{port}"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let mut conn = ClientConnection::connect(&self.server, self.timeout)?;
        conn.send(request)
    }
}

/// A persistent connection issuing strictly sequential request/response
/// pairs over one socket.
pub struct ClientConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl ClientConnection {
    pub fn connect(server: impl ToSocketAddrs + std::fmt::Debug, timeout: Duration) -> Result<Self, ClientError> {
        let target = format!("{server:?}");
        let addr: SocketAddr = server
            .to_socket_addrs()
            .map_err(|e| ClientError::Connect(target.clone(), e))?
            .next()
            .ok_or_else(|| {
                ClientError::Connect(
                    target.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
                )
            })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| ClientError::Connect(target, e))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(FramingError::Io)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(FramingError::Io)?;
        let writer = stream.try_clone().map_err(FramingError::Io)?;
        Ok(ClientConnection {
            reader: BufReader::new(stream),
            writer,
        })
    }

    pub fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        write_message(&mut self.writer, request)?;
        let Some(payload) = read_frame(&mut self.reader)? else {
            return Err(ClientError::Closed);
        };
        serde_json::from_slice(&payload).map_err(ClientError::BadResponse)
    }
}
