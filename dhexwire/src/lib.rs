// DHEx transport shell: length-prefixed framing over TCP, the client driver
// and the server accept loop. The protocol itself lives in dhexcore; this
// crate only moves frames and reports outcomes.

pub mod client;
pub mod error;
pub mod framing;
pub mod server;

pub use client::{Client, ClientConfig, EstablishedSession, HandshakeOutcome};
pub use error::{DhexWireError, Result};
pub use framing::FramedStream;
pub use server::{Server, ServerConfig};
