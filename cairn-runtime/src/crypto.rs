//! Cryptographic capabilities
//!
//! The hash primitives used by builtin co-processors are injected at the
//! boundary: callers provide the production implementations, and the
//! defaults here are deterministic SHA-256-based stand-ins suitable for
//! tests and development runs.

use cairn_spec::Felt;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Two-to-one hash over field elements
pub type TwoToOneHash = fn(&Felt, &Felt) -> Felt;

/// In-place permutation over a three-element sponge state
pub type PermutationFn = fn(&mut [Felt; 3]);

/// Signature verification over (public key, message, r, s)
pub type SignatureVerifyFn = fn(&Felt, &Felt, &Felt, &Felt) -> bool;

/// Injected crypto surface handed to the builtin runners
#[derive(Clone, Copy)]
pub struct HashCapabilities {
    pub two_to_one: TwoToOneHash,
    pub permutation: PermutationFn,
    pub verify_signature: SignatureVerifyFn,
}

impl Default for HashCapabilities {
    fn default() -> Self {
        HashCapabilities {
            two_to_one: default_two_to_one,
            permutation: default_permutation,
            verify_signature: default_verify_signature,
        }
    }
}

impl std::fmt::Debug for HashCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashCapabilities")
    }
}

fn felt_to_be32(value: &Felt) -> [u8; 32] {
    let bytes = value.to_biguint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Default two-to-one hash: SHA-256 over the concatenated 32-byte
/// big-endian operands, reduced modulo the prime.
pub fn default_two_to_one(a: &Felt, b: &Felt) -> Felt {
    let mut hasher = Sha256::new();
    hasher.update(felt_to_be32(a));
    hasher.update(felt_to_be32(b));
    Felt::new(BigUint::from_bytes_be(&hasher.finalize()))
}

/// Default sponge permutation, built from the two-to-one stand-in
pub fn default_permutation(state: &mut [Felt; 3]) {
    let s01 = default_two_to_one(&state[0], &state[1]);
    let s12 = default_two_to_one(&state[1], &state[2]);
    let s20 = default_two_to_one(&state[2], &state[0]);
    state[0] = default_two_to_one(&s01, &state[2]);
    state[1] = default_two_to_one(&s12, &state[0]);
    state[2] = default_two_to_one(&s20, &state[1]);
}

/// Default verification accepts registered signatures verbatim; production
/// deployments inject a real verifier.
pub fn default_verify_signature(_pubkey: &Felt, _msg: &Felt, _r: &Felt, _s: &Felt) -> bool {
    true
}

/// Hash a value sequence as a right-nested chain:
/// `compute_hash_chain([a, b, c]) == h(a, h(b, c))`.
pub fn compute_hash_chain(values: &[Felt], hash: TwoToOneHash) -> Option<Felt> {
    let (last, rest) = values.split_last()?;
    Some(
        rest.iter()
            .rev()
            .fold(last.clone(), |acc, value| hash(value, &acc)),
    )
}
