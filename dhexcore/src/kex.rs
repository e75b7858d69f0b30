// Finite-field Diffie-Hellman: parameter validation, keypair generation,
// shared-secret derivation. All arithmetic is on arbitrary-precision
// unsigned integers; nothing here can overflow.

use num_bigint_dig::prime::probably_prime;
use num_bigint_dig::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::rngs::OsRng;

use crate::error::{DhexCoreError, Result};

/// Default bit length for a freshly generated private exponent.
pub const DEFAULT_PRIVATE_KEY_BITS: usize = 2048;

/// Miller-Rabin rounds used when validating a received modulus.
const PRIMALITY_ROUNDS: usize = 20;

/// The modular-exponentiation parameters agreed for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    pub generator: BigUint,
    pub prime: BigUint,
}

impl DhParams {
    pub fn new(generator: BigUint, prime: BigUint) -> Self {
        Self { generator, prime }
    }

    /// Reject unusable parameters. Fatal: a composite or undersized modulus
    /// is a configuration error, never silently corrected.
    pub fn validate(&self, min_prime_bits: usize) -> Result<()> {
        let bits = self.prime.bits();
        if bits < min_prime_bits {
            return Err(DhexCoreError::PrimeTooSmall {
                bits,
                min: min_prime_bits,
            });
        }
        if !probably_prime(&self.prime, PRIMALITY_ROUNDS) {
            return Err(DhexCoreError::NotPrime);
        }
        let two = BigUint::from(2u32);
        if self.generator < two || self.generator >= &self.prime - &BigUint::one() {
            return Err(DhexCoreError::InvalidGenerator);
        }
        Ok(())
    }
}

/// One party's DH keypair for a single session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhKeyPair {
    pub private: BigUint,
    pub public: BigUint,
}

/// Build a keypair over `params`.
///
/// A `None` or zero `private_hint` generates a fresh random exponent of
/// `bits` length, clamped into `[1, prime-1)`. A non-zero hint is
/// range-checked and used verbatim; an out-of-range hint is fatal, never
/// clamped.
pub fn generate_keypair(
    params: &DhParams,
    private_hint: Option<&BigUint>,
    bits: usize,
) -> Result<DhKeyPair> {
    let private = match private_hint {
        Some(hint) if !hint.is_zero() => {
            if *hint >= params.prime {
                return Err(DhexCoreError::PrivateKeyOutOfRange);
            }
            hint.clone()
        }
        _ => random_private_key(&params.prime, bits),
    };
    let public = params.generator.modpow(&private, &params.prime);
    Ok(DhKeyPair { private, public })
}

/// Compute `peer_public ^ own_private mod prime`.
///
/// Defensive range checks only; both keys must already be known. A zero
/// private key is a protocol-level impossibility and is rejected.
pub fn derive_shared_secret(
    peer_public: &BigUint,
    own_private: &BigUint,
    prime: &BigUint,
) -> Result<BigUint> {
    if own_private.is_zero() || own_private >= prime {
        return Err(DhexCoreError::PrivateKeyOutOfRange);
    }
    if peer_public.is_zero() || peer_public >= prime {
        return Err(DhexCoreError::PublicKeyOutOfRange);
    }
    Ok(peer_public.modpow(own_private, prime))
}

/// Uniform random exponent in `[1, min(2^bits, prime-1))`.
fn random_private_key(prime: &BigUint, bits: usize) -> BigUint {
    let one = BigUint::one();
    let cap = BigUint::one() << bits;
    let p_minus_one = prime - &one;
    let upper = if cap < p_minus_one { cap } else { p_minus_one };
    OsRng.gen_biguint_range(&one, &upper)
}

/// The RFC 3526 group-14 modulus: a well-known 2048-bit safe prime, used as
/// the default server modulus and in end-to-end tests.
pub fn modp_group_2048() -> BigUint {
    const HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
                       29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
                       EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
                       E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                       EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
                       C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
                       83655D23DCA3AD961C62F356208552BB9ED529077096966D\
                       670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
                       E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
                       DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
                       15728E5A8AACAA68FFFFFFFFFFFFFFFF";
    // Constant string, cannot fail to parse.
    BigUint::parse_bytes(HEX.as_bytes(), 16).unwrap_or_default()
}
