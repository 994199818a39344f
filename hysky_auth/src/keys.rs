//! Session identity and key material supplied by an external identity provider

use std::{error, fmt, sync::Arc};

use async_trait::async_trait;
use hysky_base64::{Base64, Base64Mime};
use hysky_clock::UnixMillis;
use ring::signature::RsaKeyPair;
use thiserror::Error;

use crate::nonce::{SigningAlgorithm, SigningError};

/// The stable identifier of the session principal
pub type Identity = uuid::Uuid;

/// A private key able to produce detached signatures
pub trait Signer: fmt::Debug + Send + Sync {
    /// Whether the specific algorithm provided is compatible
    /// with this signer
    fn can_sign(&self, alg: SigningAlgorithm) -> bool;

    /// Attempts to sign the data provided using the specified algorithm
    fn sign(&self, alg: SigningAlgorithm, data: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// The private key was rejected
#[derive(Debug, Error)]
#[error("private key rejected: {reason}")]
pub struct InvalidPrivateKey {
    reason: String,
}

/// An RSA private key
#[derive(Clone)]
pub struct RsaPrivateKey {
    key_pair: Arc<RsaKeyPair>,
}

impl RsaPrivateKey {
    /// Imports a key from an unencrypted PKCS#8 document
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, InvalidPrivateKey> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8).map_err(|e| InvalidPrivateKey {
            reason: e.to_string(),
        })?;

        Ok(Self {
            key_pair: Arc::new(key_pair),
        })
    }

    /// Imports a key from a DER-encoded `RSAPrivateKey`
    pub fn from_der(der: &[u8]) -> Result<Self, InvalidPrivateKey> {
        let key_pair = RsaKeyPair::from_der(der).map_err(|e| InvalidPrivateKey {
            reason: e.to_string(),
        })?;

        Ok(Self {
            key_pair: Arc::new(key_pair),
        })
    }

    /// The paired public key as a DER-encoded `RSAPublicKey`
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        self.key_pair.public().as_ref()
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("modulus_len", &self.key_pair.public().modulus_len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Signer for RsaPrivateKey {
    fn can_sign(&self, alg: SigningAlgorithm) -> bool {
        matches!(alg, SigningAlgorithm::Rs256)
    }

    fn sign(&self, alg: SigningAlgorithm, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut buf = vec![0; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(
                alg.into_signing_params(),
                &ring::rand::SystemRandom::new(),
                data,
                &mut buf,
            )
            .map_err(|e| SigningError::Provider {
                reason: e.to_string(),
            })?;
        Ok(buf)
    }
}

/// A public key certified by the identity provider, together with the
/// private key that proves possession of it
///
/// Key material is borrowed for a single refresh cycle and never persisted.
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    public_key: Base64Mime,
    public_key_signature: Base64,
    expires_at: UnixMillis,
    private_key: Arc<dyn Signer>,
}

impl KeyMaterial {
    /// Bundles key material
    ///
    /// `public_key` is the encoded public key as issued (for RSA keys, the
    /// DER-encoded `SubjectPublicKeyInfo`), and `public_key_signature` is the
    /// provider's signature certifying it.
    pub fn new(
        public_key: impl Into<Vec<u8>>,
        public_key_signature: impl Into<Vec<u8>>,
        expires_at: UnixMillis,
        private_key: impl Signer + 'static,
    ) -> Self {
        Self {
            public_key: Base64Mime::from_raw(public_key),
            public_key_signature: Base64::from_raw(public_key_signature),
            expires_at,
            private_key: Arc::new(private_key),
        }
    }

    /// The encoded public key
    #[inline]
    pub fn public_key(&self) -> &Base64Mime {
        &self.public_key
    }

    /// The provider's signature over the public key
    #[inline]
    pub fn public_key_signature(&self) -> &Base64 {
        &self.public_key_signature
    }

    /// When the provider's certification of the key expires
    #[inline]
    pub fn expires_at(&self) -> UnixMillis {
        self.expires_at
    }

    /// The private half of the key pair
    #[inline]
    pub fn private_key(&self) -> &dyn Signer {
        &*self.private_key
    }
}

/// The identity provider failed outright while fetching key material
#[derive(Debug, Error)]
#[error("identity provider failed to fetch key material")]
pub struct KeySourceError {
    #[from]
    source: Box<dyn error::Error + Send + Sync + 'static>,
}

impl KeySourceError {
    /// Wraps the provider's underlying error
    pub fn new(source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// The source of the session identity and its key material
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity of the current session, if known
    fn identity(&self) -> Option<Identity>;

    /// Fetches key material for the current session
    ///
    /// Yields `None` when the session is not ready or the provider has no
    /// material to offer, such as when its own credentials have lapsed.
    async fn fetch_key_material(&self) -> Result<Option<KeyMaterial>, KeySourceError>;
}

/// An identity provider that always hands out the same identity and key
/// material
#[derive(Clone, Debug)]
pub struct FixedIdentityProvider {
    identity: Identity,
    key_material: Option<KeyMaterial>,
}

impl FixedIdentityProvider {
    /// Constructs a provider for `identity` that always yields `key_material`
    pub fn new(identity: Identity, key_material: KeyMaterial) -> Self {
        Self {
            identity,
            key_material: Some(key_material),
        }
    }

    /// Constructs a provider for `identity` that never has key material
    pub fn without_key_material(identity: Identity) -> Self {
        Self {
            identity,
            key_material: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentityProvider {
    fn identity(&self) -> Option<Identity> {
        Some(self.identity)
    }

    async fn fetch_key_material(&self) -> Result<Option<KeyMaterial>, KeySourceError> {
        Ok(self.key_material.clone())
    }
}
