// Server (responder) side of the handshake.
//
// One `ServerSession` per accepted connection. The admission decision
// (answering `SERVER_BUSY` instead of running a session at all) is taken by
// the accept loop before a session exists; see the transport shell.

use num_bigint_dig::BigUint;
use num_traits::Zero;

use crate::error::{DhexCoreError, Result};
use crate::kex::{self, DhKeyPair, DhParams};
use crate::message::{Request, Response};
use crate::session::{Phase, SessionConfig};

/// The responder's session state for one handshake.
#[derive(Debug)]
pub struct ServerSession {
    params: DhParams,
    config: SessionConfig,
    /// Optional pre-assigned client private exponent (test mode). Sent as
    /// `skClient`; zero on the wire when unset.
    client_key_hint: Option<BigUint>,
    phase: Phase,
    /// Request counter expected next; the client starts at 1.
    expected_n: u64,
    peer_identity: Option<String>,
    keypair: Option<DhKeyPair>,
    pk_client: Option<BigUint>,
    shared_secret: Option<BigUint>,
}

impl ServerSession {
    /// Create a responder session. The local parameters are validated up
    /// front: serving a composite or undersized modulus is a configuration
    /// error, not something to discover mid-handshake.
    pub fn new(
        params: DhParams,
        client_key_hint: Option<BigUint>,
        config: SessionConfig,
    ) -> Result<Self> {
        params.validate(config.min_prime_bits)?;
        if let Some(hint) = &client_key_hint {
            if !hint.is_zero() && *hint >= params.prime {
                return Err(DhexCoreError::PrivateKeyOutOfRange);
            }
        }
        Ok(Self {
            params,
            config,
            client_key_hint,
            phase: Phase::Init,
            expected_n: 1,
            peer_identity: None,
            keypair: None,
            pk_client: None,
            shared_secret: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The identity announced by the client's hello.
    pub fn peer_identity(&self) -> Option<&str> {
        self.peer_identity.as_deref()
    }

    /// The derived shared secret, available from `SecretDerived` on.
    pub fn shared_secret(&self) -> Option<&BigUint> {
        self.shared_secret.as_ref()
    }

    /// Whether the handshake is done and the `SERVER_FINISH` reply produced.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::SecretDerived | Phase::Closed)
    }

    /// Mark the transport released; called once by the owner when done.
    pub fn close(&mut self) {
        if self.phase == Phase::SecretDerived {
            self.phase = Phase::Closed;
        }
    }

    /// Drive the responder: consume one request, produce the matching
    /// response with the echoed counter. Any request out of phase or out of
    /// sequence poisons the session.
    pub fn process_request(&mut self, request: Request) -> Result<Response> {
        self.check_request_n(&request)?;
        let n = request.n();
        match (self.phase, request) {
            (Phase::Init, Request::Hello { id, .. }) => {
                self.peer_identity = Some(id);
                self.phase = Phase::Contacted;
                Ok(Response::Hello { n })
            }
            (Phase::Contacted, Request::DhExStart { .. }) if self.keypair.is_none() => {
                let keypair = self.with_poison(kex::generate_keypair(
                    &self.params,
                    None,
                    self.config.private_key_bits,
                ))?;
                let reply = Response::DhExStart {
                    generator: self.params.generator.clone(),
                    prime: self.params.prime.clone(),
                    pk_server: keypair.public.clone(),
                    sk_client: self.client_key_hint.clone().unwrap_or_default(),
                    n,
                };
                self.keypair = Some(keypair);
                Ok(reply)
            }
            (Phase::Contacted, Request::DhEx { pk_client, .. }) if self.keypair.is_some() => {
                if pk_client.is_zero() || pk_client >= self.params.prime {
                    self.phase = Phase::Error;
                    return Err(DhexCoreError::PublicKeyOutOfRange);
                }
                self.pk_client = Some(pk_client);
                self.phase = Phase::ParamsExchanged;
                Ok(Response::DhEx { n })
            }
            (Phase::ParamsExchanged, Request::DhExDone { .. }) => {
                let keypair = self
                    .keypair
                    .as_ref()
                    .ok_or(DhexCoreError::MissingKeyMaterial("local keypair"))?;
                let pk_client = self
                    .pk_client
                    .as_ref()
                    .ok_or(DhexCoreError::MissingKeyMaterial("client public key"))?;
                let shared =
                    kex::derive_shared_secret(pk_client, &keypair.private, &self.params.prime);
                let shared = match shared {
                    Ok(s) => s,
                    Err(e) => {
                        self.phase = Phase::Error;
                        return Err(e);
                    }
                };
                self.shared_secret = Some(shared);
                self.phase = Phase::SecretDerived;
                Ok(Response::Finish { n })
            }
            (phase, request) => {
                self.phase = Phase::Error;
                Err(DhexCoreError::UnexpectedMessage {
                    phase: phase.label(),
                    got: request.label(),
                })
            }
        }
    }

    /// Each request must carry the next counter value, in order, never
    /// reused or decremented.
    fn check_request_n(&mut self, request: &Request) -> Result<()> {
        let got = request.n();
        if got != self.expected_n {
            self.phase = Phase::Error;
            return Err(DhexCoreError::SequenceMismatch {
                expected: self.expected_n,
                got,
            });
        }
        self.expected_n += 1;
        Ok(())
    }

    fn with_poison<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.phase = Phase::Error;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            private_key_bits: 64,
            min_prime_bits: 16,
        }
    }

    fn params() -> DhParams {
        DhParams::new(BigUint::from(5u32), BigUint::from(18_446_744_073_709_551_557u64))
    }

    #[test]
    fn composite_modulus_rejected_at_construction() {
        let bad = DhParams::new(BigUint::from(5u32), BigUint::from(1_000_000u64));
        assert!(matches!(
            ServerSession::new(bad, None, config()),
            Err(DhexCoreError::NotPrime)
        ));
    }

    #[test]
    fn hint_echoed_in_params_response() {
        let hint = BigUint::from(424_242u64);
        let mut session = ServerSession::new(params(), Some(hint.clone()), config()).unwrap();
        session
            .process_request(Request::Hello {
                id: "alice".into(),
                n: 1,
            })
            .unwrap();
        match session.process_request(Request::DhExStart { n: 2 }).unwrap() {
            Response::DhExStart { sk_client, .. } => assert_eq!(sk_client, hint),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn no_hint_sends_zero_sentinel() {
        let mut session = ServerSession::new(params(), None, config()).unwrap();
        session
            .process_request(Request::Hello {
                id: "alice".into(),
                n: 1,
            })
            .unwrap();
        match session.process_request(Request::DhExStart { n: 2 }).unwrap() {
            Response::DhExStart { sk_client, .. } => assert!(sk_client.is_zero()),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn out_of_order_request_rejected() {
        let mut session = ServerSession::new(params(), None, config()).unwrap();
        let err = session
            .process_request(Request::DhExStart { n: 1 })
            .unwrap_err();
        assert!(matches!(err, DhexCoreError::UnexpectedMessage { .. }));
        assert_eq!(session.phase(), Phase::Error);
    }

    #[test]
    fn replayed_counter_rejected() {
        let mut session = ServerSession::new(params(), None, config()).unwrap();
        session
            .process_request(Request::Hello {
                id: "alice".into(),
                n: 1,
            })
            .unwrap();
        let err = session
            .process_request(Request::DhExStart { n: 1 })
            .unwrap_err();
        assert!(matches!(
            err,
            DhexCoreError::SequenceMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn zero_client_public_key_rejected() {
        let mut session = ServerSession::new(params(), None, config()).unwrap();
        session
            .process_request(Request::Hello {
                id: "alice".into(),
                n: 1,
            })
            .unwrap();
        session.process_request(Request::DhExStart { n: 2 }).unwrap();
        let err = session
            .process_request(Request::DhEx {
                pk_client: BigUint::zero(),
                n: 3,
            })
            .unwrap_err();
        assert!(matches!(err, DhexCoreError::PublicKeyOutOfRange));
    }
}
