// DHEx core error types.

use thiserror::Error;

/// Top-level error type for the dhexcore crate.
#[derive(Debug, Error)]
pub enum DhexCoreError {
    // ── Codec errors ────────────────────────────────────────────────────
    #[error("malformed message: {reason} (raw: {raw:?})")]
    Malformed { raw: String, reason: String },

    #[error("message encoding failed: {0}")]
    Encode(String),

    // ── Protocol violations ─────────────────────────────────────────────
    #[error("unexpected {got} message in phase {phase}")]
    UnexpectedMessage {
        phase: &'static str,
        got: &'static str,
    },

    #[error("sequence number mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("invalid session state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    // ── Crypto configuration errors ─────────────────────────────────────
    #[error("DH modulus is not prime")]
    NotPrime,

    #[error("DH modulus too small: {bits} bits, need at least {min}")]
    PrimeTooSmall { bits: usize, min: usize },

    #[error("DH generator out of range for the negotiated modulus")]
    InvalidGenerator,

    #[error("private key out of range [1, prime-1]")]
    PrivateKeyOutOfRange,

    #[error("public key out of range for the negotiated modulus")]
    PublicKeyOutOfRange,

    #[error("missing key material: {0}")]
    MissingKeyMaterial(&'static str),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, DhexCoreError>;
