//! Signed random nonces proving possession of a private key

use std::fmt;

use hysky_base64::Base64;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use thiserror::Error;

use crate::keys::Signer;

/// Size in bytes of a nonce
pub const NONCE_LEN: usize = 16;

/// Asymmetric signature algorithms usable for nonce proofs
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    #[default]
    Rs256,
}

impl SigningAlgorithm {
    pub(crate) fn into_signing_params(self) -> &'static dyn ring::signature::RsaEncoding {
        match self {
            Self::Rs256 => &ring::signature::RSA_PKCS1_SHA256,
        }
    }

    fn into_verification_params(self) -> &'static ring::signature::RsaParameters {
        match self {
            Self::Rs256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Rs256 => f.write_str("RS256"),
        }
    }
}

/// An error while producing a signed nonce
#[derive(Debug, Error)]
pub enum SigningError {
    /// The system random number generator failed
    #[error("unable to gather randomness for a nonce")]
    EntropyUnavailable,
    /// The key cannot produce signatures with the requested algorithm
    #[error("private key cannot sign with {alg}")]
    IncompatibleKey {
        /// The requested algorithm
        alg: SigningAlgorithm,
    },
    /// The cryptographic provider rejected the signing operation
    #[error("cryptographic provider failed to sign: {reason}")]
    Provider {
        /// The provider's explanation
        reason: String,
    },
}

/// The signature did not match the nonce and public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

/// A random nonce and a detached signature over exactly those bytes
///
/// A nonce is minted fresh for each request and never reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedNonce {
    original: Base64,
    signed: Base64,
}

impl SignedNonce {
    /// The random bytes that were signed
    #[inline]
    pub fn original(&self) -> &[u8] {
        self.original.as_slice()
    }

    /// The detached signature
    #[inline]
    pub fn signature(&self) -> &[u8] {
        self.signed.as_slice()
    }

    /// Verifies the signature against a DER-encoded `RSAPublicKey`
    pub fn verify(&self, alg: SigningAlgorithm, public_key: &[u8]) -> Result<(), SignatureMismatch> {
        ring::signature::UnparsedPublicKey::new(alg.into_verification_params(), public_key)
            .verify(self.original(), self.signature())
            .map_err(|_| SignatureMismatch { _p: () })
    }
}

/// Mints signed nonces
#[derive(Debug)]
pub struct NonceSigner {
    algorithm: SigningAlgorithm,
    rng: SystemRandom,
}

impl Default for NonceSigner {
    fn default() -> Self {
        Self::new(SigningAlgorithm::default())
    }
}

impl NonceSigner {
    /// Constructs a signer that uses `algorithm` and the system's secure
    /// random number generator
    pub fn new(algorithm: SigningAlgorithm) -> Self {
        Self {
            algorithm,
            rng: SystemRandom::new(),
        }
    }

    /// Generates a fresh nonce and signs it with `key`
    pub fn sign(&self, key: &dyn Signer) -> Result<SignedNonce, SigningError> {
        if !key.can_sign(self.algorithm) {
            return Err(SigningError::IncompatibleKey {
                alg: self.algorithm,
            });
        }

        let mut original = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut original)
            .map_err(|_| SigningError::EntropyUnavailable)?;

        let signed = key.sign(self.algorithm, &original)?;

        tracing::trace!(
            algorithm = %self.algorithm,
            signature_len = signed.len(),
            "signed fresh nonce"
        );

        Ok(SignedNonce {
            original: Base64::from_raw(original.to_vec()),
            signed: Base64::from_raw(signed),
        })
    }
}
