//! REST client for the OctoPrint HTTP endpoints the synchronizer needs.
//!
//! Only two calls are made: a passive login to obtain socket session
//! credentials, and a connection-state query used once per handshake.
//! Both are also expressed as traits so the socket layer can be driven by
//! other sources (and by fakes in tests).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use octosync_core::types::SessionCredentials;

/// Upper bound on a single REST request, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies fresh session credentials on demand.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<SessionCredentials, OctoPrintApiError>;
}

/// Reports the server's current printer connection state.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn connection_state(&self) -> Result<ConnectionState, OctoPrintApiError>;
}

/// HTTP client for a single OctoPrint server.
pub struct OctoPrintApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Response of `POST /api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Name of the user the API key belongs to.
    pub name: String,
    /// Session identifier to present on the push socket.
    pub session: String,
}

/// Response of `GET /api/connection`.
#[derive(Debug, Deserialize)]
pub struct ConnectionResponse {
    pub current: ConnectionState,
}

/// Printer connection as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionState {
    /// State label, e.g. `Operational`, `Closed`, `Error: ...`.
    pub state: String,
}

impl ConnectionState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// Whether the server has no usable link to the printer.
    pub fn is_closed(&self) -> bool {
        let state = self.state.trim().to_ascii_lowercase();
        state == "closed" || state == "offline" || state.contains("error")
    }
}

/// Errors from the OctoPrint REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum OctoPrintApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// OctoPrint returned a non-2xx status code.
    #[error("OctoPrint API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl OctoPrintApi {
    /// Create a new API client whose requests time out after
    /// [`REQUEST_TIMEOUT`].
    ///
    /// * `base_url` - server root, e.g. `http://octopi.local`.
    /// * `api_key`  - application or user API key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, OctoPrintApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Obtain a session for the push socket.
    ///
    /// Sends `POST /api/login` with `{"passive": true}`, which resolves the
    /// API key to its user without creating a browser login.
    pub async fn login(&self) -> Result<LoginResponse, OctoPrintApiError> {
        let response = self
            .client
            .post(self.endpoint("api/login"))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "passive": true }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Query the printer connection (`GET /api/connection`).
    pub async fn connection(&self) -> Result<ConnectionResponse, OctoPrintApiError> {
        let response = self
            .client
            .get(self.endpoint("api/connection"))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`OctoPrintApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, OctoPrintApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OctoPrintApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, OctoPrintApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CredentialProvider for OctoPrintApi {
    async fn credentials(&self) -> Result<SessionCredentials, OctoPrintApiError> {
        let login = self.login().await?;
        Ok(SessionCredentials::new(login.name, login.session))
    }
}

#[async_trait]
impl ConnectionProbe for OctoPrintApi {
    async fn connection_state(&self) -> Result<ConnectionState, OctoPrintApiError> {
        Ok(self.connection().await?.current)
    }
}
