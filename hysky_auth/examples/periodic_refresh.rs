use std::{path::PathBuf, time::Duration};

use clap::Parser;
use hysky_auth::{
    gateway::{self, AuthGateway},
    keys::{FixedIdentityProvider, Identity, KeyMaterial, RsaPrivateKey},
    request::ClientMetadata,
    RefreshPolicy, TokenLifecycleManager, TokenStatus,
};
use hysky_clock::UnixMillis;
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The token authority's authentication endpoint
    #[clap(short, long, env, default_value = gateway::DEFAULT_ENDPOINT)]
    endpoint: reqwest::Url,

    /// The session identity to authenticate as
    #[clap(short, long, env)]
    identity: Identity,

    /// The session's private key, as PKCS#8 DER
    #[clap(long, env, default_value = "session-key.pk8")]
    private_key_file: PathBuf,

    /// The session's public key, as SubjectPublicKeyInfo DER
    #[clap(long, env, default_value = "session-key.spki.der")]
    public_key_file: PathBuf,

    /// The identity provider's signature over the public key
    #[clap(long, env, default_value = "session-key.sig")]
    public_key_signature_file: PathBuf,

    /// When the key material expires, in milliseconds since the Unix epoch
    #[clap(long, env)]
    key_expires_at: u64,

    /// The application identifier reported to the authority
    #[clap(long, env, default_value = "skyblocker")]
    app_id: String,

    /// The platform version reported to the authority
    #[clap(long, env, default_value = "1.21.1")]
    platform_version: String,

    /// The application version reported to the authority
    #[clap(long, env, default_value = "1.22.0")]
    app_version: String,

    /// How long before expiry to refresh, in seconds
    #[clap(long, env, default_value_t = 300)]
    refresh_margin_secs: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let private_key = RsaPrivateKey::from_pkcs8(&std::fs::read(&opts.private_key_file)?)?;
    let key_material = KeyMaterial::new(
        std::fs::read(&opts.public_key_file)?,
        std::fs::read(&opts.public_key_signature_file)?,
        UnixMillis(opts.key_expires_at),
        private_key,
    );

    let client = reqwest::Client::builder().https_only(true).build()?;

    let manager = TokenLifecycleManager::new(
        FixedIdentityProvider::new(opts.identity, key_material),
        AuthGateway::with_endpoint(client, opts.endpoint),
        ClientMetadata::new(opts.app_id, opts.platform_version, opts.app_version),
    )
    .with_policy(
        RefreshPolicy::default()
            .with_refresh_margin(Duration::from_secs(opts.refresh_margin_secs)),
    );

    let handle = manager.start(async {});

    let mut interval = time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;

        let watcher = handle.watcher();
        let status = watcher.token_status();
        let Some(record) = watcher.record() else {
            tracing::info!(?status, "no token issued yet");
            continue;
        };

        match status {
            TokenStatus::Fresh => {
                tracing::debug!(
                    ?status,
                    token = format_args!("{:#?}", record.token()),
                    expires_at = record.expires_at().0,
                    "pulled token"
                )
            }
            TokenStatus::Stale => {
                tracing::warn!(
                    ?status,
                    token = format_args!("{:#?}", record.token()),
                    expires_at = record.expires_at().0,
                    "pulled token"
                )
            }
            TokenStatus::Expired | TokenStatus::Absent => {
                tracing::error!(
                    ?status,
                    expires_at = record.expires_at().0,
                    "pulled token"
                )
            }
        }
    }
}
