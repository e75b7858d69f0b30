// Client (initiator) side of the handshake.
//
// Sans-IO step API: each `*` / `process_*` pair corresponds to one
// send/receive round trip driven by the transport shell. Every outbound
// message consumes the sequence counter; every inbound message must carry
// the counter of the request it answers.

use num_bigint_dig::BigUint;
use num_traits::Zero;

use crate::error::{DhexCoreError, Result};
use crate::kex::{self, DhKeyPair, DhParams};
use crate::message::{Request, Response};
use crate::session::{Phase, SessionConfig};

/// Outcome of the contact phase: the server either acknowledged the session
/// or declined it. Busy is an outcome, not an error, so callers can
/// distinguish "try later" from every failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Acknowledged,
    Busy,
}

/// Which reply the session is blocked on, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    HelloReply,
    Params,
    ExchangeAck,
    Finish,
}

/// The initiator's session state for one handshake.
#[derive(Debug)]
pub struct ClientSession {
    identity: String,
    config: SessionConfig,
    phase: Phase,
    awaiting: Option<Awaiting>,
    /// Next sequence number to assign; starts at 1, never reused.
    counter: u64,
    /// Counter of the last request sent, which the reply must echo.
    last_sent_n: u64,
    params: Option<DhParams>,
    keypair: Option<DhKeyPair>,
    pk_server: Option<BigUint>,
    shared_secret: Option<BigUint>,
}

impl ClientSession {
    pub fn new(identity: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            identity: identity.into(),
            config,
            phase: Phase::Init,
            awaiting: None,
            counter: 1,
            last_sent_n: 0,
            params: None,
            keypair: None,
            pk_server: None,
            shared_secret: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The negotiated parameters, once received.
    pub fn params(&self) -> Option<&DhParams> {
        self.params.as_ref()
    }

    /// The server's public key, once received.
    pub fn server_public_key(&self) -> Option<&BigUint> {
        self.pk_server.as_ref()
    }

    /// The local public key, once the keypair exists.
    pub fn public_key(&self) -> Option<&BigUint> {
        self.keypair.as_ref().map(|kp| &kp.public)
    }

    /// The derived shared secret, available from `SecretDerived` on.
    pub fn shared_secret(&self) -> Option<&BigUint> {
        self.shared_secret.as_ref()
    }

    // ── Contact phase ───────────────────────────────────────────────────

    /// Step 1: produce `CLIENT_HELLO` (n=1).
    pub fn hello(&mut self) -> Result<Request> {
        self.expect(Phase::Init, None, "Contacted")?;
        let n = self.next_n();
        self.awaiting = Some(Awaiting::HelloReply);
        Ok(Request::Hello {
            id: self.identity.clone(),
            n,
        })
    }

    /// Step 2: consume the reply to the hello.
    ///
    /// `SERVER_HELLO` advances to `Contacted`; `SERVER_BUSY` lands in the
    /// terminal `Busy` phase without poisoning the session as an error.
    pub fn process_hello_reply(&mut self, reply: Response) -> Result<ContactOutcome> {
        self.expect(Phase::Init, Some(Awaiting::HelloReply), "Contacted")?;
        self.check_reply_n(&reply)?;
        self.awaiting = None;
        match reply {
            Response::Hello { .. } => {
                self.phase = Phase::Contacted;
                Ok(ContactOutcome::Acknowledged)
            }
            Response::Busy { .. } => {
                self.phase = Phase::Busy;
                Ok(ContactOutcome::Busy)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    // ── Exchange phase ──────────────────────────────────────────────────

    /// Step 3: produce `CLIENT_DHEX_START` (n=2).
    pub fn start_exchange(&mut self) -> Result<Request> {
        self.expect(Phase::Contacted, None, "ParamsExchanged")?;
        let n = self.next_n();
        self.awaiting = Some(Awaiting::Params);
        Ok(Request::DhExStart { n })
    }

    /// Step 4: consume `SERVER_DHEX_START`, validate the parameters, build
    /// the local keypair, and produce `CLIENT_DHEX` (n=3).
    ///
    /// A zero (or absent) `skClient` hint means "generate your own"; a
    /// non-zero hint is the pre-assigned private exponent, used verbatim.
    pub fn process_params(&mut self, reply: Response) -> Result<Request> {
        self.expect(Phase::Contacted, Some(Awaiting::Params), "ParamsExchanged")?;
        self.check_reply_n(&reply)?;
        let (generator, prime, pk_server, sk_client) = match reply {
            Response::DhExStart {
                generator,
                prime,
                pk_server,
                sk_client,
                ..
            } => (generator, prime, pk_server, sk_client),
            other => return Err(self.unexpected(&other)),
        };

        let params = DhParams::new(generator, prime);
        let hint = if sk_client.is_zero() {
            None
        } else {
            Some(&sk_client)
        };
        let keypair = self
            .with_poison(params.validate(self.config.min_prime_bits))
            .and_then(|_| {
                self.with_poison(kex::generate_keypair(
                    &params,
                    hint,
                    self.config.private_key_bits,
                ))
            })?;

        let n = self.next_n();
        let pk_client = keypair.public.clone();
        self.params = Some(params);
        self.keypair = Some(keypair);
        self.pk_server = Some(pk_server);
        self.awaiting = Some(Awaiting::ExchangeAck);
        Ok(Request::DhEx { pk_client, n })
    }

    /// Step 5: consume `SERVER_DHEX`, derive the shared secret, and produce
    /// `CLIENT_DHEX_DONE` (n=4).
    pub fn process_exchange_ack(&mut self, reply: Response) -> Result<Request> {
        self.expect(Phase::Contacted, Some(Awaiting::ExchangeAck), "SecretDerived")?;
        self.check_reply_n(&reply)?;
        match reply {
            Response::DhEx { .. } => {}
            other => return Err(self.unexpected(&other)),
        }
        self.phase = Phase::ParamsExchanged;

        let params = self
            .params
            .as_ref()
            .ok_or(DhexCoreError::MissingKeyMaterial("DH parameters"))?;
        let keypair = self
            .keypair
            .as_ref()
            .ok_or(DhexCoreError::MissingKeyMaterial("local keypair"))?;
        let pk_server = self
            .pk_server
            .as_ref()
            .ok_or(DhexCoreError::MissingKeyMaterial("server public key"))?;

        let shared = kex::derive_shared_secret(pk_server, &keypair.private, &params.prime);
        let shared = match shared {
            Ok(s) => s,
            Err(e) => {
                self.phase = Phase::Error;
                return Err(e);
            }
        };
        self.shared_secret = Some(shared);
        self.phase = Phase::SecretDerived;

        let n = self.next_n();
        self.awaiting = Some(Awaiting::Finish);
        Ok(Request::DhExDone { n })
    }

    // ── Exit phase ──────────────────────────────────────────────────────

    /// Step 6: consume `SERVER_FINISH` and close the session.
    pub fn process_finish(&mut self, reply: Response) -> Result<()> {
        self.expect(Phase::SecretDerived, Some(Awaiting::Finish), "Closed")?;
        self.check_reply_n(&reply)?;
        match reply {
            Response::Finish { .. } => {
                self.awaiting = None;
                self.phase = Phase::Closed;
                Ok(())
            }
            other => Err(self.unexpected(&other)),
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Consume the sequence counter: return the current value and bump it.
    fn next_n(&mut self) -> u64 {
        let n = self.counter;
        self.counter += 1;
        self.last_sent_n = n;
        n
    }

    /// A reply must echo the counter of the request it answers. A lesser
    /// (or any other) value is a protocol violation and poisons the session.
    fn check_reply_n(&mut self, reply: &Response) -> Result<()> {
        let got = reply.n();
        if got != self.last_sent_n {
            self.phase = Phase::Error;
            return Err(DhexCoreError::SequenceMismatch {
                expected: self.last_sent_n,
                got,
            });
        }
        Ok(())
    }

    /// Guard a step against being run in the wrong phase or without the
    /// matching outstanding request.
    fn expect(&self, phase: Phase, awaiting: Option<Awaiting>, to: &'static str) -> Result<()> {
        if self.phase != phase || self.awaiting != awaiting {
            return Err(DhexCoreError::InvalidStateTransition {
                from: self.phase.label(),
                to,
            });
        }
        Ok(())
    }

    /// A well-formed message in the wrong place poisons the session.
    fn unexpected(&mut self, got: &Response) -> DhexCoreError {
        let phase = self.phase.label();
        self.phase = Phase::Error;
        DhexCoreError::UnexpectedMessage {
            phase,
            got: got.label(),
        }
    }

    /// Crypto misconfiguration is fatal to the session, not just the call.
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

    fn params_reply(sk_client: BigUint, n: u64) -> Response {
        let prime = BigUint::from(18_446_744_073_709_551_557u64);
        let generator = BigUint::from(5u32);
        let sk_server = BigUint::from(77_777u64);
        let pk_server = generator.modpow(&sk_server, &prime);
        Response::DhExStart {
            generator,
            prime,
            pk_server,
            sk_client,
            n,
        }
    }

    #[test]
    fn counter_consumed_in_order() {
        let mut session = ClientSession::new("alice", config());
        assert_eq!(session.hello().unwrap().n(), 1);
        session
            .process_hello_reply(Response::Hello { n: 1 })
            .unwrap();
        assert_eq!(session.start_exchange().unwrap().n(), 2);
        let dhex = session
            .process_params(params_reply(BigUint::zero(), 2))
            .unwrap();
        assert_eq!(dhex.n(), 3);
        let done = session
            .process_exchange_ack(Response::DhEx { n: 3 })
            .unwrap();
        assert_eq!(done.n(), 4);
        session.process_finish(Response::Finish { n: 4 }).unwrap();
        assert_eq!(session.phase(), Phase::Closed);
        assert!(session.shared_secret().is_some());
    }

    #[test]
    fn busy_reply_is_terminal_but_not_error() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        let outcome = session
            .process_hello_reply(Response::Busy { n: 1 })
            .unwrap();
        assert_eq!(outcome, ContactOutcome::Busy);
        assert_eq!(session.phase(), Phase::Busy);
        // No further sends are possible.
        assert!(session.start_exchange().is_err());
    }

    #[test]
    fn stale_sequence_number_rejected() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        session
            .process_hello_reply(Response::Hello { n: 1 })
            .unwrap();
        session.start_exchange().unwrap();
        let err = session
            .process_params(params_reply(BigUint::zero(), 1))
            .unwrap_err();
        assert!(matches!(
            err,
            DhexCoreError::SequenceMismatch {
                expected: 2,
                got: 1
            }
        ));
        assert_eq!(session.phase(), Phase::Error);
    }

    #[test]
    fn out_of_phase_message_poisons_session() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        let err = session
            .process_hello_reply(Response::Finish { n: 1 })
            .unwrap_err();
        assert!(matches!(err, DhexCoreError::UnexpectedMessage { .. }));
        assert_eq!(session.phase(), Phase::Error);
    }

    #[test]
    fn hello_twice_is_invalid_transition() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        assert!(matches!(
            session.hello(),
            Err(DhexCoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn composite_modulus_poisons_session() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        session
            .process_hello_reply(Response::Hello { n: 1 })
            .unwrap();
        session.start_exchange().unwrap();
        let reply = Response::DhExStart {
            generator: BigUint::from(5u32),
            prime: BigUint::from(1_000_000u64),
            pk_server: BigUint::from(3u32),
            sk_client: BigUint::zero(),
            n: 2,
        };
        assert!(matches!(
            session.process_params(reply),
            Err(DhexCoreError::NotPrime)
        ));
        assert_eq!(session.phase(), Phase::Error);
    }

    #[test]
    fn non_zero_hint_used_verbatim() {
        let mut session = ClientSession::new("alice", config());
        session.hello().unwrap();
        session
            .process_hello_reply(Response::Hello { n: 1 })
            .unwrap();
        session.start_exchange().unwrap();
        let hint = BigUint::from(424_242u64);
        let reply = params_reply(hint.clone(), 2);
        let dhex = session.process_params(reply).unwrap();
        let params = session.params().unwrap();
        let expected_pk = params.generator.modpow(&hint, &params.prime);
        assert_eq!(dhex, Request::DhEx {
            pk_client: expected_pk,
            n: 3
        });
    }
}
