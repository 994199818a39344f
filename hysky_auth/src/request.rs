//! The authentication request sent to the token authority

use hysky_base64::{Base64, Base64Mime};
use hysky_clock::UnixMillis;
use serde::Serialize;
use thiserror::Error;

use crate::{
    keys::{Identity, KeyMaterial},
    nonce::SignedNonce,
    AppId,
};

/// Static metadata describing the client requesting a token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMetadata {
    /// The application identifier
    pub app_id: AppId,

    /// The version of the platform the application runs on
    pub platform_version: String,

    /// The version of the application itself
    pub app_version: String,
}

impl ClientMetadata {
    /// Constructs client metadata
    pub fn new(
        app_id: impl Into<String>,
        platform_version: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            app_id: AppId::new(app_id.into()),
            platform_version: platform_version.into(),
            app_version: app_version.into(),
        }
    }
}

/// The session identity was not known when building the request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("session identity is unknown")]
pub struct MissingIdentity {
    _p: (),
}

/// The certified public key and who it belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairInfo {
    /// The session identity, serialized in its hyphenated string form
    pub uuid: Identity,
    /// The encoded public key
    pub public_key: Base64Mime,
    /// The provider's signature over the public key
    pub public_key_signature: Base64,
    /// When the provider's certification expires
    pub expires_at: UnixMillis,
}

/// An authentication request
///
/// Built fresh for every refresh cycle and discarded once sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthRequest {
    /// The certified key pair
    #[serde(rename = "keyPair")]
    pub key_pair: KeyPairInfo,
    /// Proof of possession of the private key
    #[serde(rename = "signedData")]
    pub signed_data: SignedNonce,
    /// The application identifier
    #[serde(rename = "mod")]
    pub app_id: AppId,
    /// The platform version
    #[serde(rename = "minecraftVersion")]
    pub platform_version: String,
    /// The application version
    #[serde(rename = "modVersion")]
    pub app_version: String,
}

/// Assembles an authentication request from one cycle's inputs
///
/// Fails only if the session identity is unknown.
pub fn build_request(
    identity: Option<Identity>,
    key_material: &KeyMaterial,
    signed_nonce: SignedNonce,
    client: &ClientMetadata,
) -> Result<AuthRequest, MissingIdentity> {
    let uuid = identity.ok_or(MissingIdentity { _p: () })?;

    Ok(AuthRequest {
        key_pair: KeyPairInfo {
            uuid,
            public_key: key_material.public_key().clone(),
            public_key_signature: key_material.public_key_signature().clone(),
            expires_at: key_material.expires_at(),
        },
        signed_data: signed_nonce,
        app_id: client.app_id.clone(),
        platform_version: client.platform_version.clone(),
        app_version: client.app_version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use hysky_base64::Base64;
    use serde_json::json;

    use super::*;
    use crate::{nonce::NonceSigner, test_util};

    #[test]
    fn request_matches_the_wire_schema() {
        let material = test_util::key_material();
        let nonce = NonceSigner::default().sign(material.private_key()).unwrap();

        let request = build_request(
            Some(test_util::IDENTITY),
            &material,
            nonce.clone(),
            &test_util::client_metadata(),
        )
        .unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "keyPair": {
                    "uuid": test_util::IDENTITY.hyphenated().to_string(),
                    "publicKey": material.public_key().encode(),
                    "publicKeySignature": Base64::from_raw(test_util::KEY_SIGNATURE.to_vec()).encode(),
                    "expiresAt": test_util::KEY_EXPIRES_AT.0,
                },
                "signedData": {
                    "original": Base64::from_raw(nonce.original().to_vec()).encode(),
                    "signed": Base64::from_raw(nonce.signature().to_vec()).encode(),
                },
                "mod": "skyblocker",
                "minecraftVersion": "1.21.1",
                "modVersion": "1.22.0",
            })
        );
    }

    #[test]
    fn public_key_is_sent_in_mime_lines() {
        let material = test_util::key_material();
        let nonce = NonceSigner::default().sign(material.private_key()).unwrap();
        let request = build_request(
            Some(test_util::IDENTITY),
            &material,
            nonce,
            &test_util::client_metadata(),
        )
        .unwrap();

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r"\r\n"));
    }

    #[test]
    fn unknown_identity_fails_fast() {
        let material = test_util::key_material();
        let nonce = NonceSigner::default().sign(material.private_key()).unwrap();

        let err = build_request(None, &material, nonce, &test_util::client_metadata())
            .unwrap_err();
        assert_eq!(err.to_string(), "session identity is unknown");
    }
}
