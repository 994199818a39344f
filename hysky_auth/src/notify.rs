//! User-facing advisories about refresh failures

use std::fmt;

/// An advisory raised when a refresh cycle fails
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Advisory {
    /// The identity provider had no key material; the session may need restarting
    SessionKeysUnavailable,
    /// Requesting a token failed; features relying on it may not work
    AuthenticationFailed,
}

impl Advisory {
    /// A stable key suitable for looking up a localized message
    pub fn key(self) -> &'static str {
        match self {
            Self::SessionKeysUnavailable => "api.token.noProfileKeys",
            Self::AuthenticationFailed => "api.token.authFailure",
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SessionKeysUnavailable => f.write_str(
                "Failed to fetch profile keys! Some features may not work temporarily. \
                 Has the session been open for more than 24 hours? If so, restart.",
            ),
            Self::AuthenticationFailed => {
                f.write_str("Failed to refresh the API token! Some features might not work.")
            }
        }
    }
}

/// Surfaces advisories to a human
///
/// Implementations own any de-duplication policy.
pub trait Notifier: Send + Sync {
    /// Delivers an advisory
    fn notify(&self, advisory: Advisory);
}

/// A notifier that emits advisories as warning events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, advisory: Advisory) {
        tracing::warn!(advisory = advisory.key(), "{}", advisory);
    }
}
