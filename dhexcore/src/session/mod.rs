// Session state machines for both ends of the handshake.

pub mod client;
pub mod server;

pub use client::{ClientSession, ContactOutcome};
pub use server::ServerSession;

use crate::kex::DEFAULT_PRIVATE_KEY_BITS;

/// The ordered phases of one handshake.
///
/// `Busy` and `Error` are absorbing: once entered, every further step is an
/// invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created, nothing exchanged yet.
    Init,
    /// Hello acknowledged by the peer.
    Contacted,
    /// DH parameters and both public keys exchanged.
    ParamsExchanged,
    /// Shared secret derived locally.
    SecretDerived,
    /// Session ended cleanly.
    Closed,
    /// The server declined for capacity reasons. Terminal; the caller may
    /// retry later, the session itself never does.
    Busy,
    /// A protocol violation or crypto misconfiguration poisoned the session.
    Error,
}

impl Phase {
    /// Human-readable label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Init => "Init",
            Phase::Contacted => "Contacted",
            Phase::ParamsExchanged => "ParamsExchanged",
            Phase::SecretDerived => "SecretDerived",
            Phase::Closed => "Closed",
            Phase::Busy => "Busy",
            Phase::Error => "Error",
        }
    }
}

/// Per-session knobs for the key-exchange math.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bit length of a freshly generated private exponent.
    pub private_key_bits: usize,
    /// Smallest acceptable modulus, in bits.
    pub min_prime_bits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            private_key_bits: DEFAULT_PRIVATE_KEY_BITS,
            min_prime_bits: 1024,
        }
    }
}
