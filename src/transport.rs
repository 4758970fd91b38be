//! Exchanging renewal messages.
//!
//! Renewal requests and responses are exchanged over a reliable stream
//! connection to the control service of the remote AS. Each message is
//! sent as a single frame: a four octet big-endian length followed by that
//! many octets of payload. A connection carries exactly one request and
//! one response.
//!
//! How the remote AS is reached is left to a [`Transport`]. The
//! [`TcpTransport`] provided here simply looks up the address in a static
//! map. On the other side, [`serve`] accepts connections and hands each
//! request to a [`Handler`].

use std::{error, fmt, io};
use std::collections::HashMap;
use std::future::Future;
use std::marker::Unpin;
use std::net::SocketAddr;
use std::sync::Arc;
use bytes::Bytes;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::spawn;
use tokio::time::{timeout, Duration};
use crate::ia::Ia;


//------------ Constants -----------------------------------------------------

/// The largest payload of a frame.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// How long the server waits for a request on a new connection.
const SERVER_IO_TIMEOUT: Duration = Duration::from_secs(10);


//------------ Transport -----------------------------------------------------

/// A way to connect to the control service of a remote AS.
pub trait Transport: Send + Sync {
    /// The connection type.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection to the remote AS.
    ///
    /// If `local` is given, the connection is made from that address.
    fn dial(
        &self, remote: Ia, local: Option<SocketAddr>
    ) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}


//------------ TcpTransport --------------------------------------------------

/// A transport using plain TCP to statically configured addresses.
#[derive(Clone, Debug, Default)]
pub struct TcpTransport {
    remotes: HashMap<Ia, SocketAddr>,
}

impl TcpTransport {
    pub fn new(remotes: HashMap<Ia, SocketAddr>) -> Self {
        TcpTransport { remotes }
    }

    /// Adds or replaces the address of a remote AS.
    pub fn insert(&mut self, remote: Ia, addr: SocketAddr) {
        self.remotes.insert(remote, addr);
    }
}

impl Transport for TcpTransport {
    type Conn = TcpStream;

    fn dial(
        &self, remote: Ia, local: Option<SocketAddr>
    ) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send {
        let addr = self.remotes.get(&remote).copied();
        async move {
            let addr = addr.ok_or(TransportError::UnknownRemote(remote))?;
            debug!("Connecting to {} at {}", remote, addr);
            match local {
                Some(local) => {
                    let sock = if local.is_ipv4() {
                        TcpSocket::new_v4()?
                    }
                    else {
                        TcpSocket::new_v6()?
                    };
                    sock.bind(local)?;
                    Ok(sock.connect(addr).await?)
                }
                None => Ok(TcpStream::connect(addr).await?)
            }
        }
    }
}


//------------ Framing -------------------------------------------------------

/// Reads a single frame from a socket.
pub async fn read_frame<Sock: AsyncRead + Unpin>(
    sock: &mut Sock
) -> Result<Bytes, TransportError> {
    let len = sock.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len))
    }
    let mut res = vec![0u8; len];
    sock.read_exact(&mut res).await?;
    Ok(res.into())
}

/// Writes a single frame to a socket.
pub async fn write_frame<Sock: AsyncWrite + Unpin>(
    sock: &mut Sock, payload: &[u8]
) -> Result<(), TransportError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()))
    }
    sock.write_u32(payload.len() as u32).await?;
    sock.write_all(payload).await?;
    sock.flush().await?;
    Ok(())
}

/// Sends a request and waits for the reply without any time limit.
///
/// Callers are expected to bound the exchange themselves.
pub async fn round_trip<Sock: AsyncRead + AsyncWrite + Unpin>(
    conn: &mut Sock, payload: &[u8]
) -> Result<Bytes, TransportError> {
    write_frame(conn, payload).await?;
    read_frame(conn).await
}

/// Sends a request and waits for the reply.
///
/// The whole exchange has to finish before the timeout expires.
pub async fn request<Sock: AsyncRead + AsyncWrite + Unpin>(
    conn: &mut Sock, payload: &[u8], limit: Duration,
) -> Result<Bytes, TransportError> {
    match timeout(limit, round_trip(conn, payload)).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::Timeout),
    }
}


//------------ Handler and serve ---------------------------------------------

/// A type that answers requests received by [`serve`].
pub trait Handler: Send + Sync + 'static {
    /// Processes a request.
    ///
    /// Returns the reply or `None` if the connection should be closed
    /// without reply.
    fn handle(&self, request: Bytes) -> Option<Bytes>;
}

/// Serves requests arriving on a listener.
///
/// Each connection is handled in its own task. The function only returns
/// if accepting a connection fails.
pub async fn serve<H: Handler>(
    listener: TcpListener, handler: Arc<H>
) -> Result<(), io::Error> {
    loop {
        let (sock, addr) = listener.accept().await?;
        debug!("Accepted connection from {}", addr);
        let handler = handler.clone();
        let _ = spawn(async move {
            if let Err(err) = serve_connection(sock, handler).await {
                warn!("Connection from {} failed: {}", addr, err);
            }
        });
    }
}

async fn serve_connection<H: Handler>(
    mut sock: TcpStream, handler: Arc<H>
) -> Result<(), TransportError> {
    let request = match timeout(
        SERVER_IO_TIMEOUT, read_frame(&mut sock)
    ).await {
        Ok(res) => res?,
        Err(_) => return Err(TransportError::Timeout),
    };
    if let Some(reply) = handler.handle(request) {
        match timeout(SERVER_IO_TIMEOUT, write_frame(&mut sock, &reply)).await {
            Ok(res) => res?,
            Err(_) => return Err(TransportError::Timeout),
        }
    }
    Ok(())
}


//------------ TransportError ------------------------------------------------

/// Exchanging messages with a remote AS failed.
#[derive(Debug)]
pub enum TransportError {
    /// An IO error happened.
    Io(io::Error),

    /// The exchange did not finish in time.
    Timeout,

    /// The exchange was cancelled.
    Cancelled,

    /// A frame exceeded the maximum length.
    FrameTooLarge(usize),

    /// There is no address for the remote AS.
    UnknownRemote(Ia),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TransportError::Io(ref err) => err.fmt(f),
            TransportError::Timeout => f.write_str("request timed out"),
            TransportError::Cancelled => f.write_str("request cancelled"),
            TransportError::FrameTooLarge(len) => {
                write!(f, "frame of {} octets exceeds limit", len)
            }
            TransportError::UnknownRemote(ia) => {
                write!(f, "no address for {}", ia)
            }
        }
    }
}

impl error::Error for TransportError { }


//============ Tests =========================================================
