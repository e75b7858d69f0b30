// DHEx protocol core: message codec, key-exchange math, session state machine.
//
// This crate is sans-IO. Sessions consume decoded messages and hand back the
// messages to transmit; the transport shell (dhexwire) owns the socket.
//
//   Client                              Server
//     |--- CLIENT_HELLO (n=1) ------>|
//     |<-- SERVER_HELLO / BUSY ------|
//     |--- CLIENT_DHEX_START (n=2) ->|
//     |<-- SERVER_DHEX_START --------|   gen, prime, pkServer, skClient?
//     |--- CLIENT_DHEX (n=3) ------->|   pkClient
//     |<-- SERVER_DHEX --------------|
//     |--- CLIENT_DHEX_DONE (n=4) -->|
//     |<-- SERVER_FINISH ------------|

pub mod error;
pub mod kex;
pub mod message;
pub mod session;

// Re-export the bigint type so downstream crates stay on one version.
pub use num_bigint_dig::BigUint;

pub use error::{DhexCoreError, Result};
pub use kex::DhParams;
pub use message::{Request, Response};
pub use session::{ClientSession, ContactOutcome, Phase, ServerSession, SessionConfig};
