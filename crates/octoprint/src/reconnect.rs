//! Retry ladder for establishing an authenticated OctoPrint socket.
//!
//! Credentials are fetched first; only then is the socket opened and the
//! `auth` message sent. Any failure along the way waits according to
//! [`ReconnectPolicy`] and starts over, forever, until the
//! [`CancellationToken`] is triggered.
//!
//! Delays go through `tokio::time`, so tests can run the ladder on a paused
//! clock.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::{CredentialProvider, OctoPrintApiError};
use crate::client::{ClientError, OctoPrintClient, OctoPrintConnection};

/// Fixed two-step backoff: a short delay for the first attempts, then a
/// long delay indefinitely. No jitter, no attempt limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub short_delay: Duration,
    /// Number of failures that wait `short_delay`.
    pub short_attempts: u32,
    pub long_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_secs(5),
            short_attempts: 6,
            long_delay: Duration::from_secs(15),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after the `failure`-th consecutive failure (1-based).
    pub fn delay_for(&self, failure: u32) -> Duration {
        if failure <= self.short_attempts {
            self.short_delay
        } else {
            self.long_delay
        }
    }
}

/// Consecutive-failure counter walking a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.policy.delay_for(self.failures)
    }

    /// Start the ladder over after a confirmed connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Why a single connection attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Failed to fetch session credentials: {0}")]
    Credentials(#[from] OctoPrintApiError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Fetch credentials, open the socket, authenticate, and optionally set the
/// push throttle.
pub async fn open_authenticated(
    client: &OctoPrintClient,
    credentials: &dyn CredentialProvider,
    throttle: Option<u32>,
) -> Result<OctoPrintConnection, ConnectError> {
    let session = credentials.credentials().await?;
    let mut conn = client.connect().await?;
    conn.authenticate(&session).await?;
    if let Some(factor) = throttle {
        conn.set_throttle(factor).await?;
    }
    Ok(conn)
}

/// Keep trying [`open_authenticated`] until it succeeds.
///
/// Returns `None` if `cancel` is triggered first. The caller resets
/// `backoff` once the server confirms the connection.
pub async fn connect_with_backoff(
    client: &OctoPrintClient,
    credentials: &dyn CredentialProvider,
    throttle: Option<u32>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Option<OctoPrintConnection> {
    loop {
        let attempt = backoff.failures() + 1;
        tracing::info!(attempt, url = %client.ws_url(), "Connecting to OctoPrint");

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Connect cancelled");
                return None;
            }
            result = open_authenticated(client, credentials, throttle) => result,
        };

        match result {
            Ok(conn) => return Some(conn),
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection attempt failed, retrying",
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return None;
                }
            }
        }
    }
}

/// Sleep for `delay`. Returns `false` if cancelled first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
