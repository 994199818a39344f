//! A single round trip to the token authority

use std::error;

use async_trait::async_trait;
use reqwest::{header, Url};
use thiserror::Error;

use crate::{policy::FailureKind, request::AuthRequest, TokenRecord};

/// The content type of authentication requests
pub const CONTENT_TYPE: &str = "application/json";

/// The endpoint used unless another is configured
pub const DEFAULT_ENDPOINT: &str = "https://hysky.de/api/aaron/authenticate";

/// An error while exchanging bytes with the token authority
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unable to send the request to the authority
    #[error("error sending request to token authority")]
    RequestSend(#[source] Box<dyn error::Error + Send + Sync + 'static>),
    /// The authority answered with a non-success status
    #[error("token authority responded with status {status}: {body}")]
    ErrorWithBody {
        /// The HTTP status code
        status: u16,
        /// The body of the error
        body: String,
    },
    /// Unable to read the response
    #[error("error reading response body")]
    BodyRead(#[source] Box<dyn error::Error + Send + Sync + 'static>),
}

/// An error while requesting a token from the authority
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request could not be serialized
    #[error("unable to encode authentication request")]
    Encoding(#[source] serde_json::Error),
    /// The round trip itself failed
    #[error("error exchanging authentication request with token authority")]
    Transport(#[from] TransportError),
    /// The response was not a well-formed token
    #[error("error deserializing token body from authority")]
    Decoding(#[source] serde_json::Error),
}

impl GatewayError {
    /// The failure kind reported for this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Encoding(_) => FailureKind::EncodingError,
            Self::Transport(_) => FailureKind::TransportError,
            Self::Decoding(_) => FailureKind::DecodingError,
        }
    }
}

/// Posts JSON bodies and returns the raw response body
///
/// Connection management, TLS, and timeouts are the transport's concern.
/// Non-success statuses must be reported as errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` as `application/json` to `url`
    async fn post_json(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn post_json(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .post(url.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::RequestSend(e.into()))?;

        let status = resp.status();
        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from authority"
        );

        if !status.is_success() {
            let body = resp
                .text()
                .await
                .map_err(|e| TransportError::BodyRead(e.into()))?;
            return Err(TransportError::ErrorWithBody {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::BodyRead(e.into()))?;
        Ok(body.to_vec())
    }
}

/// Exchanges authentication requests for tokens
#[derive(Debug)]
pub struct AuthGateway<T> {
    transport: T,
    endpoint: Url,
}

impl<T> AuthGateway<T> {
    /// Constructs a gateway that talks to the default endpoint
    pub fn new(transport: T) -> Self {
        let endpoint = Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL");
        Self::with_endpoint(transport, endpoint)
    }

    /// Constructs a gateway that talks to `endpoint`
    pub fn with_endpoint(transport: T, endpoint: Url) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// The endpoint authentication requests are posted to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> AuthGateway<T> {
    /// Submits `request` and parses the issued token
    #[tracing::instrument(
        err,
        skip(self, request),
        fields(
            endpoint = %self.endpoint,
            identity = %request.key_pair.uuid,
        ),
    )]
    pub async fn submit(&self, request: &AuthRequest) -> Result<TokenRecord, GatewayError> {
        tracing::trace!("requesting token from authority");

        let body = serde_json::to_vec(request).map_err(GatewayError::Encoding)?;
        let resp = self.transport.post_json(&self.endpoint, body).await?;
        let token: TokenRecord = serde_json::from_slice(&resp).map_err(GatewayError::Decoding)?;

        tracing::debug!(
            issued_at = token.issued_at().0,
            expires_at = token.expires_at().0,
            lifetime_secs = token.lifetime().as_secs(),
            "received new token"
        );

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use hysky_clock::UnixMillis;

    use super::*;
    use crate::test_util::{self, StubTransport};

    fn gateway(transport: StubTransport) -> AuthGateway<StubTransport> {
        AuthGateway::new(transport)
    }

    #[test]
    fn defaults_to_the_production_endpoint() {
        let gateway = gateway(StubTransport::new());
        assert_eq!(gateway.endpoint().as_str(), DEFAULT_ENDPOINT);
    }

    #[tokio::test]
    async fn parses_the_issued_token() {
        let transport =
            StubTransport::new().respond_with(r#"{"token":"abc","issuedAt":1000,"expiresAt":301000}"#);
        let gateway = gateway(transport);

        let token = gateway.submit(&test_util::auth_request()).await.unwrap();

        assert_eq!(token.token().as_str(), "abc");
        assert_eq!(token.issued_at(), UnixMillis(1_000));
        assert_eq!(token.expires_at(), UnixMillis(301_000));
    }

    #[tokio::test]
    async fn posts_the_serialized_request() {
        let transport = StubTransport::new()
            .respond_with(r#"{"token":"abc","issuedAt":1000,"expiresAt":301000}"#);
        let gateway = gateway(transport);
        let request = test_util::auth_request();

        gateway.submit(&request).await.unwrap();

        let sent = gateway.transport().requests();
        assert_eq!(sent.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(body, serde_json::to_value(&request).unwrap());
    }

    #[tokio::test]
    async fn malformed_bodies_are_decoding_errors() {
        let gateway = gateway(StubTransport::new().respond_with(r#"{"token":"abc"}"#));

        let err = gateway.submit(&test_util::auth_request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::Decoding(_)));
        assert_eq!(err.kind(), FailureKind::DecodingError);
    }

    #[tokio::test]
    async fn inverted_validity_windows_are_decoding_errors() {
        let gateway = gateway(
            StubTransport::new()
                .respond_with(r#"{"token":"abc","issuedAt":301000,"expiresAt":1000}"#),
        );

        let err = gateway.submit(&test_util::auth_request()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DecodingError);
    }

    #[tokio::test]
    async fn transport_failures_are_reported_as_such() {
        let gateway = gateway(StubTransport::new().fail_with_status(503, "maintenance"));

        let err = gateway.submit(&test_util::auth_request()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::TransportError);
        assert!(matches!(
            err,
            GatewayError::Transport(TransportError::ErrorWithBody { status: 503, .. })
        ));
    }
}
