use std::{
    any::Any,
    error::Error as StdError,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    gateway::{AuthGateway, GatewayError, Transport},
    keys::{IdentityProvider, KeySourceError},
    nonce::{NonceSigner, SigningError},
    notify::{Advisory, Notifier, TracingNotifier},
    policy::{FailureKind, RefreshPolicy},
    request::{build_request, ClientMetadata, MissingIdentity},
    schedule::{ScheduledTask, Scheduler, TokioScheduler},
    ApiToken, TokenRecord, TokenWatcher,
};

/// Everything that can cut a refresh cycle short
#[derive(Debug, Error)]
pub enum CycleError {
    /// The identity provider yielded no key material
    #[error("identity provider has no key material for the session")]
    KeyMaterialUnavailable,
    /// The identity provider failed outright
    #[error(transparent)]
    KeySource(#[from] KeySourceError),
    /// The nonce could not be signed, so no request was sent
    #[error("unable to sign nonce")]
    Signing(#[from] SigningError),
    /// The session identity was unknown when building the request
    #[error(transparent)]
    MissingIdentity(#[from] MissingIdentity),
    /// The round trip to the authority failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The cycle panicked
    #[error("refresh cycle panicked: {message}")]
    Panicked {
        /// The panic message, if it carried one
        message: String,
    },
}

impl CycleError {
    /// The failure kind used to pick a retry delay and advisory
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::KeyMaterialUnavailable => FailureKind::KeyMaterialUnavailable,
            Self::KeySource(_) | Self::MissingIdentity(_) | Self::Panicked { .. } => {
                FailureKind::Unexpected
            }
            Self::Signing(_) => FailureKind::SigningFailure,
            Self::Gateway(err) => err.kind(),
        }
    }
}

/// Keeps an API token fresh by periodically re-authenticating
///
/// Each cycle fetches key material from the identity provider, signs a fresh
/// nonce with it, and exchanges the resulting request for a token. Success
/// publishes the token and schedules the next cycle shortly before it
/// expires; failure schedules a retry. Every cycle ends by scheduling exactly
/// one continuation, and at most one cycle is in flight at a time.
///
/// The manager is configured and then handed off with
/// [`start()`][Self::start()]; from then on only the startup signal and the
/// manager's own continuations run cycles.
pub struct TokenLifecycleManager<P, T> {
    identity_provider: P,
    gateway: AuthGateway<T>,
    signer: NonceSigner,
    client: ClientMetadata,
    policy: Arc<RefreshPolicy>,
    scheduler: Arc<dyn Scheduler>,
    notifier: Arc<dyn Notifier>,
    publisher: watch::Sender<Option<Arc<TokenRecord>>>,
    in_flight: AtomicBool,
    stopped: Arc<AtomicBool>,
}

impl<P, T> fmt::Debug for TokenLifecycleManager<P, T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("gateway", &self.gateway)
            .field("signer", &self.signer)
            .field("client", &self.client)
            .field("policy", &self.policy)
            .field("in_flight", &self.in_flight)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl<P, T> TokenLifecycleManager<P, T> {
    /// Constructs a manager with the default policy, nonce signer, tokio
    /// scheduler, and logging notifier
    pub fn new(identity_provider: P, gateway: AuthGateway<T>, client: ClientMetadata) -> Self {
        let (publisher, _) = watch::channel(None);

        Self {
            identity_provider,
            gateway,
            signer: NonceSigner::default(),
            client,
            policy: Arc::new(RefreshPolicy::default()),
            scheduler: Arc::new(TokioScheduler),
            notifier: Arc::new(TracingNotifier),
            publisher,
            in_flight: AtomicBool::new(false),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the refresh and retry policy
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Sets the scheduler used to run future cycles
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Sets the notifier that receives advisories about failed cycles
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Sets the nonce signer
    pub fn with_signer(mut self, signer: NonceSigner) -> Self {
        self.signer = signer;
        self
    }

    /// Constructs a watcher over the tokens this manager publishes
    pub fn watcher(&self) -> TokenWatcher {
        TokenWatcher::new(self.publisher.subscribe(), self.policy.clone())
    }
}

impl<P, T> TokenLifecycleManager<P, T>
where
    P: IdentityProvider + 'static,
    T: Transport + 'static,
{
    /// Hands the manager off to run its first cycle once `startup` completes
    ///
    /// `startup` is the one-time signal that the identity provider is ready.
    /// The first cycle is scheduled immediately and waits on it.
    pub fn start<F>(self, startup: F) -> RefreshHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = RefreshHandle {
            stopped: self.stopped.clone(),
            watcher: self.watcher(),
        };

        let manager = Arc::new(self);
        let scheduler = manager.scheduler.clone();
        scheduler.schedule_once(
            Duration::ZERO,
            Box::pin(async move {
                startup.await;
                tracing::debug!("startup signal received, starting token refresh");
                manager.run_cycle().await
            }),
        );

        handle
    }

    fn cycle_task(self: Arc<Self>) -> ScheduledTask {
        Box::pin(self.run_cycle())
    }

    async fn run_cycle(self: Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::debug!("token refresh stopped, not starting cycle");
            return;
        }

        let Some(in_flight) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("refresh cycle already in flight, ignoring trigger");
            return;
        };

        let outcome = AssertUnwindSafe(self.refresh())
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(CycleError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        let (delay, advisory) = match outcome {
            Ok(record) => (self.store(record), None),
            Err(error) => self.fail(&error),
        };

        drop(in_flight);
        self.schedule_next(delay);

        if let Some(advisory) = advisory {
            self.advise(advisory);
        }
    }

    async fn refresh(&self) -> Result<TokenRecord, CycleError> {
        tracing::trace!("awaiting key material");
        let key_material = self
            .identity_provider
            .fetch_key_material()
            .await?
            .ok_or(CycleError::KeyMaterialUnavailable)?;

        tracing::trace!(
            key_expires_at = key_material.expires_at().0,
            "signing nonce"
        );
        let nonce = self.signer.sign(key_material.private_key())?;

        let request = build_request(
            self.identity_provider.identity(),
            &key_material,
            nonce,
            &self.client,
        )?;

        tracing::trace!("requesting token");
        Ok(self.gateway.submit(&request).await?)
    }

    fn store(&self, record: TokenRecord) -> Duration {
        let delay = record.refresh_delay(&self.policy);

        tracing::info!(
            issued_at = record.issued_at().0,
            expires_at = record.expires_at().0,
            lifetime_secs = record.lifetime().as_secs(),
            refresh_in_secs = delay.as_secs(),
            "stored new API token"
        );

        self.publisher.send_replace(Some(Arc::new(record)));
        delay
    }

    fn fail(&self, error: &CycleError) -> (Duration, Option<Advisory>) {
        let kind = error.kind();
        let delay = self.policy.retry_delay(kind);

        tracing::error!(
            %kind,
            error = (error as &dyn StdError),
            retry_in_secs = delay.as_secs(),
            "failed to refresh API token, will retry"
        );

        let advisory = match kind {
            FailureKind::KeyMaterialUnavailable => Advisory::SessionKeysUnavailable,
            _ => Advisory::AuthenticationFailed,
        };
        (delay, Some(advisory))
    }

    /// Runs after the continuation is scheduled; a panicking notifier must
    /// not end the refresh loop
    fn advise(&self, advisory: Advisory) {
        let notifier = &self.notifier;
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(advisory)));
        if let Err(payload) = delivered {
            tracing::error!(
                advisory = advisory.key(),
                panic = %panic_message(payload.as_ref()),
                "notifier panicked while delivering advisory"
            );
        }
    }

    fn schedule_next(self: &Arc<Self>, delay: Duration) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::debug!("token refresh stopped, not scheduling another cycle");
            return;
        }

        tracing::debug!(delay_secs = delay.as_secs(), "scheduling next refresh cycle");
        self.scheduler.schedule_once(delay, self.clone().cycle_task());
    }
}

/// Marks a cycle as in flight, releasing the mark when dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("opaque panic payload")
    }
}

/// A handle to a running token refresh loop
#[derive(Clone, Debug)]
pub struct RefreshHandle {
    stopped: Arc<AtomicBool>,
    watcher: TokenWatcher,
}

impl RefreshHandle {
    /// Constructs a watcher over the published tokens
    pub fn watcher(&self) -> TokenWatcher {
        self.watcher.clone()
    }

    /// The current token, if one has been issued
    pub fn token(&self) -> Option<ApiToken> {
        self.watcher.token()
    }

    /// Stops the refresh loop
    ///
    /// No cycle starts after this call, and a cycle already in flight does
    /// not schedule a continuation. The last published token stays readable.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::info!("stopping token refresh");
        }
    }

    /// Whether [`stop()`][Self::stop()] has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
