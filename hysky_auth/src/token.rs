use std::time::Duration;

use hysky_clock::{Clock, System, UnixMillis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{policy::RefreshPolicy, ApiToken, ApiTokenRef};

/// A token as issued by the authority, along with its validity window
///
/// Records are immutable. A refresh replaces the whole record rather than
/// mutating it in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenRecordDto", rename_all = "camelCase")]
pub struct TokenRecord {
    token: ApiToken,
    issued_at: UnixMillis,
    expires_at: UnixMillis,
}

/// The token's validity window is empty or inverted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("token expires at {expires_at} which is not after its issue time {issued_at}")]
pub struct InvalidValidityWindow {
    /// When the token was reportedly issued
    pub issued_at: UnixMillis,
    /// When the token reportedly expires
    pub expires_at: UnixMillis,
}

/// A token's lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// No token has been issued yet
    Absent,
    /// The token is valid and not yet due for a refresh
    Fresh,
    /// The token is valid, but inside the refresh margin
    Stale,
    /// The token is no longer valid
    Expired,
}

impl TokenRecord {
    /// Constructs a new record, enforcing that the token expires after it
    /// was issued
    pub fn new(
        token: ApiToken,
        issued_at: UnixMillis,
        expires_at: UnixMillis,
    ) -> Result<Self, InvalidValidityWindow> {
        if issued_at < expires_at {
            Ok(Self {
                token,
                issued_at,
                expires_at,
            })
        } else {
            Err(InvalidValidityWindow {
                issued_at,
                expires_at,
            })
        }
    }

    /// Gets the bearer token
    #[inline]
    pub fn token(&self) -> &ApiTokenRef {
        &self.token
    }

    /// Gets the time that the token was issued
    #[inline]
    pub fn issued_at(&self) -> UnixMillis {
        self.issued_at
    }

    /// Gets the time that the token will expire
    #[inline]
    pub fn expires_at(&self) -> UnixMillis {
        self.expires_at
    }

    /// Gets the token's total lifetime
    #[inline]
    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// Computes how long to wait before requesting a replacement
    ///
    /// The lifetime is truncated to whole seconds before the policy's refresh
    /// margin is subtracted, and the result never drops below the policy's
    /// minimum refresh delay.
    pub fn refresh_delay(&self, policy: &RefreshPolicy) -> Duration {
        let lifetime_secs = self.lifetime().as_secs();
        let margin_secs = policy.refresh_margin().as_secs();
        let delay = Duration::from_secs(lifetime_secs.saturating_sub(margin_secs));
        delay.max(policy.min_refresh_delay())
    }

    /// Gets the token's current lifetime status
    #[inline]
    pub fn token_status(&self, policy: &RefreshPolicy) -> TokenStatus {
        self.token_status_with_clock(policy, &System)
    }

    /// Gets the token's lifetime status based on the current time
    /// as reported by the provided clock
    #[inline]
    pub fn token_status_with_clock<C: Clock>(
        &self,
        policy: &RefreshPolicy,
        clock: &C,
    ) -> TokenStatus {
        self.token_status_at(policy, clock.now())
    }

    /// Gets the token's lifetime status as of the provided time
    pub fn token_status_at(&self, policy: &RefreshPolicy, time: UnixMillis) -> TokenStatus {
        if time >= self.expires_at {
            TokenStatus::Expired
        } else if time >= self.expires_at - policy.refresh_margin() {
            TokenStatus::Stale
        } else {
            TokenStatus::Fresh
        }
    }

    /// Gets a duration for how much longer the token would be valid as of the
    /// provided time
    #[inline]
    pub fn until_expired_at(&self, time: UnixMillis) -> Duration {
        self.expires_at - time
    }

    /// Gets a duration for how much longer the token will be valid based on the
    /// current time as reported by the provided clock
    #[inline]
    pub fn until_expired_with_clock<C: Clock>(&self, clock: &C) -> Duration {
        self.until_expired_at(clock.now())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRecordDto {
    token: ApiToken,
    issued_at: UnixMillis,
    expires_at: UnixMillis,
}

impl TryFrom<TokenRecordDto> for TokenRecord {
    type Error = InvalidValidityWindow;

    fn try_from(dto: TokenRecordDto) -> Result<Self, Self::Error> {
        Self::new(dto.token, dto.issued_at, dto.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use hysky_clock::TestClock;

    use super::*;

    fn record(issued_at: u64, expires_at: u64) -> TokenRecord {
        TokenRecord::new(
            ApiToken::from_static("abc"),
            UnixMillis(issued_at),
            UnixMillis(expires_at),
        )
        .unwrap()
    }

    #[test]
    fn rejects_tokens_that_expire_before_they_are_issued() {
        let err = TokenRecord::new(ApiToken::from_static("abc"), UnixMillis(5), UnixMillis(5))
            .unwrap_err();
        assert_eq!(err.issued_at, UnixMillis(5));
        assert_eq!(err.expires_at, UnixMillis(5));
    }

    #[test]
    fn refresh_is_scheduled_five_minutes_before_expiry() {
        let one_hour = record(1_000, 3_601_000);
        assert_eq!(
            one_hour.refresh_delay(&RefreshPolicy::default()),
            Duration::from_secs(3_300)
        );
    }

    #[test]
    fn refresh_delay_truncates_the_lifetime_to_whole_seconds() {
        let almost_ten_minutes = record(0, 599_999);
        assert_eq!(
            almost_ten_minutes.refresh_delay(&RefreshPolicy::default()),
            Duration::from_secs(299)
        );
    }

    #[test]
    fn refresh_delay_is_clamped_for_short_lived_tokens() {
        let five_minutes = record(1_000, 301_000);
        assert_eq!(
            five_minutes.refresh_delay(&RefreshPolicy::default()),
            Duration::ZERO
        );

        let one_minute = record(0, 60_000);
        let policy = RefreshPolicy::default().with_min_refresh_delay(Duration::from_secs(10));
        assert_eq!(one_minute.refresh_delay(&policy), Duration::from_secs(10));
    }

    #[test]
    fn status_follows_the_validity_window() {
        let policy = RefreshPolicy::default();
        let token = record(0, 3_600_000);

        assert_eq!(token.token_status_at(&policy, UnixMillis(0)), TokenStatus::Fresh);
        assert_eq!(
            token.token_status_at(&policy, UnixMillis(3_300_000)),
            TokenStatus::Stale
        );
        assert_eq!(
            token.token_status_at(&policy, UnixMillis(3_600_000)),
            TokenStatus::Expired
        );
    }

    #[test]
    fn remaining_validity_saturates_after_expiry() {
        let token = record(0, 10_000);
        assert_eq!(token.until_expired_at(UnixMillis(4_000)), Duration::from_secs(6));
        assert_eq!(token.until_expired_at(UnixMillis(20_000)), Duration::ZERO);
    }

    #[test]
    fn remaining_validity_follows_the_clock() {
        let token = record(0, 10_000);
        let mut clock = TestClock::new(UnixMillis(1_000));
        assert_eq!(token.until_expired_with_clock(&clock), Duration::from_secs(9));

        clock.advance(Duration::from_secs(9));
        assert_eq!(token.until_expired_with_clock(&clock), Duration::ZERO);
    }

    #[test]
    fn deserializes_the_wire_response() {
        let token: TokenRecord =
            serde_json::from_str(r#"{"token":"abc","issuedAt":1000,"expiresAt":301000}"#)
                .unwrap();
        assert_eq!(token.token().as_str(), "abc");
        assert_eq!(token.issued_at(), UnixMillis(1_000));
        assert_eq!(token.lifetime(), Duration::from_secs(300));
    }

    #[test]
    fn deserialization_enforces_the_validity_window() {
        let err = serde_json::from_str::<TokenRecord>(
            r#"{"token":"abc","issuedAt":301000,"expiresAt":1000}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not after its issue time"));
    }
}
