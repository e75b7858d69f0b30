// Server shell: TCP accept loop, one task per connection, and the shared
// admission counter that decides whether a hello gets a session or a
// SERVER_BUSY.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use dhexcore::kex::DhParams;
use dhexcore::message::{Request, Response};
use dhexcore::session::{Phase, ServerSession, SessionConfig};
use dhexcore::BigUint;

use crate::error::{DhexWireError, Result};
use crate::framing::FramedStream;

/// Construction parameters for the listening server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Sessions allowed to run concurrently before helloes are refused.
    pub max_sessions: usize,
    /// DH parameters served to every client.
    pub params: DhParams,
    /// Optional pre-assigned client private exponent (test mode); sent as
    /// `skClient` in the parameters response.
    pub client_key_hint: Option<BigUint>,
    /// Bounded wait for each client request.
    pub receive_timeout: Duration,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn new(port: u16, params: DhParams) -> Self {
        Self {
            port,
            max_sessions: 16,
            params,
            client_key_hint: None,
            receive_timeout: Duration::from_secs(30),
            session: SessionConfig::default(),
        }
    }
}

/// RAII admission permit: holds a slot in the shared active-session counter
/// and gives it back on drop, whichever way the session ends.
struct SessionPermit {
    active: Arc<AtomicUsize>,
}

impl SessionPermit {
    /// Take a slot if one is free. The counter is the only state shared
    /// across sessions, and it is only touched through atomic updates.
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|_| Self {
                active: Arc::clone(active),
            })
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Listening handshake server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listening socket. Fails early on an unusable port or an
    /// unusable DH configuration.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.params.validate(config.session.min_prime_bits)?;
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address, useful when the configured port was 0.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and dispatch until the caller drops the future.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let permit = SessionPermit::acquire(&self.active, self.config.max_sessions);
            let config = self.config.clone();
            tokio::spawn(async move {
                let result = match permit {
                    Some(_permit) => {
                        debug!(%peer, "session admitted");
                        handle_session(stream, config).await
                    }
                    None => {
                        info!(%peer, "at capacity, refusing session");
                        refuse_busy(stream, config.receive_timeout).await
                    }
                };
                if let Err(e) = result {
                    warn!(%peer, error = %e, "session ended with error");
                }
            });
        }
    }
}

/// Drive one admitted session: receive, decode, step the state machine,
/// reply; stop after SERVER_FINISH goes out.
async fn handle_session(stream: TcpStream, config: ServerConfig) -> Result<()> {
    let receive_timeout = config.receive_timeout;
    let mut framed = FramedStream::new(stream);
    let mut session = ServerSession::new(config.params, config.client_key_hint, config.session)?;

    let result = async {
        loop {
            let request = recv_request(&mut framed, receive_timeout).await?;
            let response = session.process_request(request)?;
            let text = response.encode()?;
            debug!(msg = %text, "sending");
            framed.send_frame(text.as_bytes()).await?;
            if matches!(response, Response::Finish { .. }) {
                session.close();
                break;
            }
        }
        debug_assert_eq!(session.phase(), Phase::Closed);
        if let Some(id) = session.peer_identity() {
            info!(peer_identity = id, "session finished");
        }
        Ok(())
    }
    .await;

    // Release the transport exactly once, success or not.
    let _ = framed.shutdown().await;
    result
}

/// Refuse an over-capacity client: read its hello, echo the counter in a
/// SERVER_BUSY, and close without admitting a session.
async fn refuse_busy(stream: TcpStream, receive_timeout: Duration) -> Result<()> {
    let mut framed = FramedStream::new(stream);
    let result = async {
        let request = recv_request(&mut framed, receive_timeout).await?;
        let busy = Response::Busy { n: request.n() };
        framed.send_frame(busy.encode()?.as_bytes()).await
    }
    .await;
    let _ = framed.shutdown().await;
    result
}

async fn recv_request(
    framed: &mut FramedStream<TcpStream>,
    receive_timeout: Duration,
) -> Result<Request> {
    let frame = timeout(receive_timeout, framed.recv_frame())
        .await
        .map_err(|_| DhexWireError::Timeout)??;
    let text = std::str::from_utf8(&frame).map_err(|_| DhexWireError::FrameNotUtf8)?;
    debug!(msg = %text, "received");
    Request::decode(text).map_err(|e| {
        warn!(raw = %text, "failed to decode client request");
        e.into()
    })
}
