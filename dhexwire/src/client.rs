// Client driver: connects over TCP and walks a ClientSession through the
// four handshake phases, one blocking round trip at a time.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use dhexcore::kex::DhParams;
use dhexcore::message::{Request, Response};
use dhexcore::session::{ClientSession, ContactOutcome, SessionConfig};
use dhexcore::BigUint;

use crate::error::{DhexWireError, Result};
use crate::framing::FramedStream;

/// Construction parameters for one client handshake.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub server_port: u16,
    /// Identity string announced in the hello.
    pub identity: String,
    /// Bounded wait for each reply; the reference design had none, which
    /// let a silent peer hang the session forever.
    pub reply_timeout: Duration,
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(
        server_addr: impl Into<String>,
        server_port: u16,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            server_addr: server_addr.into(),
            server_port,
            identity: identity.into(),
            reply_timeout: Duration::from_secs(10),
            session: SessionConfig::default(),
        }
    }
}

/// How a completed run ended: with keys, or with a server that asked us to
/// come back later. Failures are errors, not outcomes.
#[derive(Debug)]
pub enum HandshakeOutcome {
    Established(EstablishedSession),
    Busy,
}

/// Everything the caller needs from a successful handshake.
#[derive(Debug)]
pub struct EstablishedSession {
    pub params: DhParams,
    pub server_public_key: BigUint,
    pub client_public_key: BigUint,
    pub shared_secret: BigUint,
}

/// One-shot handshake client.
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Connect and run the handshake to completion. The transport is shut
    /// down exactly once on every exit path, including the busy one.
    pub async fn run(&self) -> Result<HandshakeOutcome> {
        let addr = (self.config.server_addr.as_str(), self.config.server_port);
        let stream = TcpStream::connect(addr).await?;
        info!(
            addr = %self.config.server_addr,
            port = self.config.server_port,
            "connected to server"
        );
        let mut framed = FramedStream::new(stream);

        let result = self.handshake(&mut framed).await;
        // Release the transport regardless of how the handshake went.
        let _ = framed.shutdown().await;
        result
    }

    async fn handshake(
        &self,
        framed: &mut FramedStream<TcpStream>,
    ) -> Result<HandshakeOutcome> {
        let mut session = ClientSession::new(self.config.identity.clone(), self.config.session.clone());

        // Contact phase.
        self.send(framed, &session.hello()?).await?;
        let reply = self.recv(framed).await?;
        match session.process_hello_reply(reply)? {
            ContactOutcome::Busy => {
                info!("server is busy, try again later");
                return Ok(HandshakeOutcome::Busy);
            }
            ContactOutcome::Acknowledged => {}
        }

        // Exchange phase.
        self.send(framed, &session.start_exchange()?).await?;
        let reply = self.recv(framed).await?;
        let dhex = session.process_params(reply)?;
        self.send(framed, &dhex).await?;
        let reply = self.recv(framed).await?;
        let done = session.process_exchange_ack(reply)?;
        self.send(framed, &done).await?;

        // Exit phase.
        let reply = self.recv(framed).await?;
        session.process_finish(reply)?;
        info!("handshake complete");

        let established = EstablishedSession {
            params: session
                .params()
                .cloned()
                .ok_or(dhexcore::DhexCoreError::MissingKeyMaterial("DH parameters"))?,
            server_public_key: session
                .server_public_key()
                .cloned()
                .ok_or(dhexcore::DhexCoreError::MissingKeyMaterial("server public key"))?,
            client_public_key: session
                .public_key()
                .cloned()
                .ok_or(dhexcore::DhexCoreError::MissingKeyMaterial("client public key"))?,
            shared_secret: session
                .shared_secret()
                .cloned()
                .ok_or(dhexcore::DhexCoreError::MissingKeyMaterial("shared secret"))?,
        };
        Ok(HandshakeOutcome::Established(established))
    }

    async fn send(&self, framed: &mut FramedStream<TcpStream>, request: &Request) -> Result<()> {
        let text = request.encode()?;
        debug!(msg = %text, "sending");
        framed.send_frame(text.as_bytes()).await
    }

    async fn recv(&self, framed: &mut FramedStream<TcpStream>) -> Result<Response> {
        let frame = timeout(self.config.reply_timeout, framed.recv_frame())
            .await
            .map_err(|_| DhexWireError::Timeout)??;
        let text = std::str::from_utf8(&frame).map_err(|_| DhexWireError::FrameNotUtf8)?;
        debug!(msg = %text, "received");
        Response::decode(text).map_err(|e| {
            warn!(raw = %text, "failed to decode server reply");
            e.into()
        })
    }
}
