//! Self-renewing API tokens backed by a signed-nonce proof of key possession
//!
//! A client holding a session identity and short-lived key material from an
//! identity provider can exchange a proof of possession of that key for an
//! API token. This crate keeps such a token fresh in the background, so that
//! consumers only ever read the latest token and never trigger or wait on a
//! refresh themselves.
//!
//! # General Flow
//!
//! Each refresh cycle asks the [`IdentityProvider`][keys::IdentityProvider]
//! for key material, signs a fresh random nonce with the private key, and
//! posts the signed nonce together with the public key and client metadata
//! to the token authority through an [`AuthGateway`][gateway::AuthGateway].
//! The issued token is published to every [`TokenWatcher`], and the next
//! cycle is scheduled a [refresh margin][RefreshPolicy::refresh_margin] ahead
//! of its expiry.
//!
//! Failures never surface to readers. The previous token, if any, stays in
//! place, a retry is scheduled according to the [`RefreshPolicy`], and an
//! [`Advisory`][notify::Advisory] is handed to the configured
//! [`Notifier`][notify::Notifier].
//!
//! ```no_run
//! use hysky_auth::{
//!     gateway::AuthGateway,
//!     keys::{FixedIdentityProvider, Identity, KeyMaterial, RsaPrivateKey},
//!     request::ClientMetadata,
//!     TokenLifecycleManager,
//! };
//! use hysky_clock::UnixMillis;
//!
//! # fn load(_: &str) -> Vec<u8> { Vec::new() }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity: Identity = "5f3ab1c2-7d4e-4f60-9a8b-1c2d3e4f5a6b".parse()?;
//! let private_key = RsaPrivateKey::from_der(&load("session-key.der"))?;
//! let key_material = KeyMaterial::new(
//!     load("session-key.spki.der"),
//!     load("session-key.sig"),
//!     UnixMillis(1_700_000_000_000),
//!     private_key,
//! );
//!
//! let manager = TokenLifecycleManager::new(
//!     FixedIdentityProvider::new(identity, key_material),
//!     AuthGateway::new(reqwest::Client::new()),
//!     ClientMetadata::new("skyblocker", "1.21.1", "1.22.0"),
//! );
//!
//! let handle = manager.start(async {});
//! let mut watcher = handle.watcher();
//! watcher.changed().await?;
//!
//! tracing::info!(
//!     token = format_args!("{:#?}", watcher.token()),
//!     "first API token"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! This crate includes an example of a periodic refresh against a live
//! authority in the examples folder.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod gateway;
pub mod keys;
mod manager;
pub mod nonce;
pub mod notify;
pub mod policy;
pub mod request;
pub mod schedule;
mod token;
mod watcher;

#[cfg(test)]
mod test_util;

pub use braids::*;
pub use manager::{CycleError, RefreshHandle, TokenLifecycleManager};
pub use policy::{FailureKind, RefreshPolicy};
pub use token::{InvalidValidityWindow, TokenRecord, TokenStatus};
pub use watcher::{TokenPublisherQuit, TokenWatcher};
