//! WebSocket client for the OctoPrint push socket.
//!
//! [`OctoPrintClient`] holds the socket endpoint derived from the server's
//! HTTP base URL. Call [`OctoPrintClient::connect`] to open a live
//! [`OctoPrintConnection`], then authenticate it before frames flow.

use std::time::Duration;

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use octosync_core::types::SessionCredentials;

/// Path of the raw WebSocket transport of OctoPrint's SockJS endpoint.
pub const SOCKET_PATH: &str = "sockjs/websocket";

/// Upper bound on sending the close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for one OctoPrint push socket.
pub struct OctoPrintClient {
    ws_url: String,
}

/// A live, possibly not yet authenticated, socket connection.
pub struct OctoPrintConnection {
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl OctoPrintClient {
    /// Create a client for the server at `base_url` (e.g. `http://octopi.local`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            ws_url: websocket_url(base_url)?,
        })
    }

    /// Socket endpoint, e.g. `ws://octopi.local/sockjs/websocket`.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open the WebSocket.
    pub async fn connect(&self) -> Result<OctoPrintConnection, ClientError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| {
                ClientError::Connection(format!(
                    "Failed to connect to OctoPrint at {}: {e}",
                    self.ws_url
                ))
            })?;

        tracing::info!(url = %self.ws_url, "Opened OctoPrint socket");

        Ok(OctoPrintConnection { ws_stream })
    }
}

impl OctoPrintConnection {
    /// Send `{"auth": "<user>:<session>"}`.
    pub async fn authenticate(
        &mut self,
        credentials: &SessionCredentials,
    ) -> Result<(), ClientError> {
        tracing::debug!(user = %credentials.user, "Authenticating OctoPrint socket");
        self.send_json(&serde_json::json!({ "auth": credentials.auth_token() }))
            .await
    }

    /// Ask the server to push `current` frames at 1/`factor` of its default
    /// rate.
    pub async fn set_throttle(&mut self, factor: u32) -> Result<(), ClientError> {
        self.send_json(&serde_json::json!({ "throttle": factor }))
            .await
    }

    /// Close the socket, ignoring errors from an already-dead peer.
    ///
    /// Gives up after [`CLOSE_TIMEOUT`] if the peer stops reading.
    pub async fn close(&mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.ws_stream.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Error while closing OctoPrint socket");
            }
            Err(_) => tracing::debug!("Timed out closing OctoPrint socket"),
        }
    }

    async fn send_json(&mut self, payload: &serde_json::Value) -> Result<(), ClientError> {
        self.ws_stream
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| ClientError::Protocol(format!("Failed to send frame: {e}")))
    }
}

/// Derive the push-socket URL from the server's HTTP base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and [`SOCKET_PATH`] is
/// appended to whatever path the base URL already has.
pub fn websocket_url(base_url: &str) -> Result<String, ClientError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "{base_url}: unsupported scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(format!("{base_url}: cannot use {scheme}")))?;
    url.set_query(None);
    url.set_fragment(None);

    Ok(format!(
        "{}/{SOCKET_PATH}",
        url.as_str().trim_end_matches('/')
    ))
}

/// Errors that can occur when working with the socket client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server base URL cannot be turned into a socket endpoint.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
