// DHEx wire messages and their JSON codec.
//
// Each message is a flat JSON record: a `type` tag, the sequence counter `n`,
// and the type-specific fields. The tag set is closed; decoding anything
// outside it is a codec error, never a partial message. Big integers travel
// as decimal strings since JSON numbers cannot hold 2048-bit values
// losslessly.

use num_bigint_dig::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{DhexCoreError, Result};

/// Requests sent by the client, one per handshake step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Opens the session, announcing the client identity.
    #[serde(rename = "CLIENT_HELLO")]
    Hello { id: String, n: u64 },

    /// Asks the server for the DH public parameters.
    #[serde(rename = "CLIENT_DHEX_START")]
    DhExStart { n: u64 },

    /// Delivers the client's public key.
    #[serde(rename = "CLIENT_DHEX")]
    DhEx {
        #[serde(rename = "pkClient", with = "biguint_dec")]
        pk_client: BigUint,
        n: u64,
    },

    /// Signals that the client has derived the shared secret.
    #[serde(rename = "CLIENT_DHEX_DONE")]
    DhExDone { n: u64 },
}

/// Responses sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "SERVER_HELLO")]
    Hello { n: u64 },

    /// Carries the negotiated DH parameters and the server's public key.
    ///
    /// `skClient` optionally pre-assigns the client's private exponent
    /// (test mode). Absent or zero means "generate your own"; zero is the
    /// sentinel, not a usable key.
    #[serde(rename = "SERVER_DHEX_START")]
    DhExStart {
        #[serde(rename = "gen", with = "biguint_dec")]
        generator: BigUint,
        #[serde(with = "biguint_dec")]
        prime: BigUint,
        #[serde(rename = "pkServer", with = "biguint_dec")]
        pk_server: BigUint,
        #[serde(rename = "skClient", default, with = "biguint_dec")]
        sk_client: BigUint,
        n: u64,
    },

    #[serde(rename = "SERVER_DHEX")]
    DhEx { n: u64 },

    /// Ends a successful session.
    #[serde(rename = "SERVER_FINISH")]
    Finish { n: u64 },

    /// The server declined the session for capacity reasons.
    #[serde(rename = "SERVER_BUSY")]
    Busy { n: u64 },
}

impl Request {
    /// Serialize to the JSON wire text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DhexCoreError::Encode(e.to_string()))
    }

    /// Parse from the JSON wire text. Fails on invalid syntax, an unknown
    /// `type` tag, or a missing required field.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DhexCoreError::Malformed {
            raw: raw.to_owned(),
            reason: e.to_string(),
        })
    }

    /// The sequence counter carried by this message.
    pub fn n(&self) -> u64 {
        match self {
            Request::Hello { n, .. }
            | Request::DhExStart { n }
            | Request::DhEx { n, .. }
            | Request::DhExDone { n } => *n,
        }
    }

    /// Wire tag, used in protocol-violation diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "CLIENT_HELLO",
            Request::DhExStart { .. } => "CLIENT_DHEX_START",
            Request::DhEx { .. } => "CLIENT_DHEX",
            Request::DhExDone { .. } => "CLIENT_DHEX_DONE",
        }
    }
}

impl Response {
    /// Serialize to the JSON wire text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DhexCoreError::Encode(e.to_string()))
    }

    /// Parse from the JSON wire text. Fails on invalid syntax, an unknown
    /// `type` tag, or a missing required field.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DhexCoreError::Malformed {
            raw: raw.to_owned(),
            reason: e.to_string(),
        })
    }

    /// The sequence counter carried by this message.
    pub fn n(&self) -> u64 {
        match self {
            Response::Hello { n }
            | Response::DhExStart { n, .. }
            | Response::DhEx { n }
            | Response::Finish { n }
            | Response::Busy { n } => *n,
        }
    }

    /// Wire tag, used in protocol-violation diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Response::Hello { .. } => "SERVER_HELLO",
            Response::DhExStart { .. } => "SERVER_DHEX_START",
            Response::DhEx { .. } => "SERVER_DHEX",
            Response::Finish { .. } => "SERVER_FINISH",
            Response::Busy { .. } => "SERVER_BUSY",
        }
    }
}

/// Decimal-string serde adapter for [`BigUint`] wire fields.
mod biguint_dec {
    use num_bigint_dig::BigUint;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(de)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal integer {s:?}")))
    }
}
