use std::sync::Arc;

use hysky_clock::{Clock, System};
use thiserror::Error;
use tokio::sync::watch;

use crate::{policy::RefreshPolicy, ApiToken, TokenRecord, TokenStatus};

/// A token watcher that can be used to obtain the latest token
///
/// Reads never block on or trigger a refresh. Until the first successful
/// refresh there is no token.
#[derive(Clone, Debug)]
pub struct TokenWatcher {
    watcher: watch::Receiver<Option<Arc<TokenRecord>>>,
    policy: Arc<RefreshPolicy>,
}

/// The token publisher has gone away and no new tokens will be published
#[derive(Debug, Error)]
#[error("token publisher has quit")]
pub struct TokenPublisherQuit {
    #[from]
    source: watch::error::RecvError,
}

impl TokenWatcher {
    pub(crate) fn new(
        watcher: watch::Receiver<Option<Arc<TokenRecord>>>,
        policy: Arc<RefreshPolicy>,
    ) -> Self {
        Self { watcher, policy }
    }

    /// The current token, if one has been issued
    ///
    /// A token that has passed its expiry is still returned until a
    /// replacement arrives.
    pub fn token(&self) -> Option<ApiToken> {
        self.watcher
            .borrow()
            .as_ref()
            .map(|record| record.token().to_owned())
    }

    /// The current token record, if one has been issued
    pub fn record(&self) -> Option<Arc<TokenRecord>> {
        self.watcher.borrow().clone()
    }

    /// Gets the current token's lifetime status
    #[inline]
    pub fn token_status(&self) -> TokenStatus {
        self.token_status_with_clock(&System)
    }

    /// Gets the current token's lifetime status based on the current time
    /// as reported by the provided clock
    pub fn token_status_with_clock<C: Clock>(&self, clock: &C) -> TokenStatus {
        match &*self.watcher.borrow() {
            Some(record) => record.token_status_with_clock(&self.policy, clock),
            None => TokenStatus::Absent,
        }
    }

    /// A future that returns as ready whenever a new token is published
    ///
    /// If the publisher is ever dropped, then this function will return an error
    /// indicating that no new tokens will be published.
    pub async fn changed(&mut self) -> Result<(), TokenPublisherQuit> {
        Ok(self.watcher.changed().await?)
    }
}
