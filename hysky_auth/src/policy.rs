//! Refresh and retry timing

use std::{fmt, time::Duration};

/// The broad class of a failed refresh cycle
///
/// Every failure is retried; the class only decides how long to wait and
/// how the failure is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The identity provider had no key material for the session
    KeyMaterialUnavailable,
    /// The nonce could not be signed
    SigningFailure,
    /// The request could not be serialized
    EncodingError,
    /// The round trip to the token authority failed
    TransportError,
    /// The authority's response was not a well-formed token
    DecodingError,
    /// Anything else that went wrong during a cycle
    Unexpected,
}

impl FailureKind {
    /// Whether the failure came out of the gateway round trip
    pub fn is_gateway_failure(self) -> bool {
        matches!(
            self,
            Self::EncodingError | Self::TransportError | Self::DecodingError
        )
    }

    /// A stable, machine-friendly name for the kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyMaterialUnavailable => "key_material_unavailable",
            Self::SigningFailure => "signing_failure",
            Self::EncodingError => "encoding_error",
            Self::TransportError => "transport_error",
            Self::DecodingError => "decoding_error",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for when tokens are refreshed and failures retried
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    refresh_margin: Duration,
    min_refresh_delay: Duration,
    transient_retry_delay: Duration,
    key_material_retry_delay: Duration,
}

impl Default for RefreshPolicy {
    /// Default refresh policy
    ///
    /// Refreshes tokens 5 minutes before they expire, retries transient
    /// failures after 1 minute, and waits 5 minutes when the identity
    /// provider has no key material. Refresh delays are not clamped above
    /// zero.
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(300),
            min_refresh_delay: Duration::ZERO,
            transient_retry_delay: Duration::from_secs(60),
            key_material_retry_delay: Duration::from_secs(300),
        }
    }
}

impl RefreshPolicy {
    /// Sets how long before expiry a token should be refreshed
    pub fn with_refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = refresh_margin;
        self
    }

    /// Sets the smallest delay scheduled after a successful refresh
    pub fn with_min_refresh_delay(mut self, min_refresh_delay: Duration) -> Self {
        self.min_refresh_delay = min_refresh_delay;
        self
    }

    /// Sets the retry delay used after signing, gateway, or unexpected failures
    pub fn with_transient_retry_delay(mut self, transient_retry_delay: Duration) -> Self {
        self.transient_retry_delay = transient_retry_delay;
        self
    }

    /// Sets the retry delay used when the identity provider yields no key material
    pub fn with_key_material_retry_delay(mut self, key_material_retry_delay: Duration) -> Self {
        self.key_material_retry_delay = key_material_retry_delay;
        self
    }

    /// How long before expiry a token is refreshed
    #[inline]
    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// The smallest delay scheduled after a successful refresh
    #[inline]
    pub fn min_refresh_delay(&self) -> Duration {
        self.min_refresh_delay
    }

    /// The delay before retrying a failure of the given kind
    pub fn retry_delay(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::KeyMaterialUnavailable => self.key_material_retry_delay,
            _ => self.transient_retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_material_waits_longer_than_transient_failures() {
        let policy = RefreshPolicy::default();
        assert_eq!(
            policy.retry_delay(FailureKind::KeyMaterialUnavailable),
            Duration::from_secs(300)
        );

        for kind in [
            FailureKind::SigningFailure,
            FailureKind::EncodingError,
            FailureKind::TransportError,
            FailureKind::DecodingError,
            FailureKind::Unexpected,
        ] {
            assert_eq!(policy.retry_delay(kind), Duration::from_secs(60), "{kind}");
        }
    }

    #[test]
    fn delays_can_be_tuned() {
        let policy = RefreshPolicy::default()
            .with_transient_retry_delay(Duration::from_secs(5))
            .with_key_material_retry_delay(Duration::from_secs(30))
            .with_refresh_margin(Duration::from_secs(120));

        assert_eq!(
            policy.retry_delay(FailureKind::DecodingError),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.retry_delay(FailureKind::KeyMaterialUnavailable),
            Duration::from_secs(30)
        );
        assert_eq!(policy.refresh_margin(), Duration::from_secs(120));
    }

    #[test]
    fn only_round_trip_failures_count_as_gateway_failures() {
        assert!(FailureKind::DecodingError.is_gateway_failure());
        assert!(FailureKind::TransportError.is_gateway_failure());
        assert!(!FailureKind::SigningFailure.is_gateway_failure());
        assert!(!FailureKind::KeyMaterialUnavailable.is_gateway_failure());
    }
}
