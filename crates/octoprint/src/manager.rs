//! OctoPrint session manager.
//!
//! [`OctoPrintSync`] owns one long-lived connection task per server. The
//! task loops connect -> authenticate -> process frames -> reconnect until
//! [`OctoPrintSync::shutdown`] is called. Every cycle starts by resetting
//! both status records to their "connecting" defaults; the last printer
//! event survives reconnects.
//!
//! Consumers read the synchronized state through the
//! [`SubscriptionHub`] accessors exposed here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use octosync_core::clock::{Clock, SystemClock};
use octosync_core::config::SyncConfig;
use octosync_core::job::JobStatus;
use octosync_core::printer::PrinterStatus;
use octosync_core::printer_event::{PrinterEvent, RAW_DISCONNECTED};
use octosync_core::types::SessionCredentials;

use crate::api::{
    ConnectionProbe, ConnectionState, CredentialProvider, OctoPrintApi, OctoPrintApiError,
};
use crate::client::{ClientError, OctoPrintClient, OctoPrintConnection};
use crate::hub::{ReplaySubscription, SubscriptionHub};
use crate::processor::{FrameDispatcher, FrameOutcome};
use crate::reconnect::{
    connect_with_backoff, sleep_or_cancel, Backoff, ConnectError, ReconnectPolicy,
};

/// How long [`OctoPrintSync::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the status of one OctoPrint server synchronized.
///
/// Created once at startup and shared as `Arc<OctoPrintSync>`.
pub struct OctoPrintSync {
    config: SyncConfig,
    client: OctoPrintClient,
    credentials: Arc<dyn CredentialProvider>,
    probe: Arc<dyn ConnectionProbe>,
    clock: Arc<dyn Clock>,
    hub: Arc<SubscriptionHub>,
    policy: ReconnectPolicy,
    /// Flips to `true` on the first `connected` acknowledgment.
    ready: watch::Sender<bool>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl OctoPrintSync {
    /// Build a synchronizer talking to the server REST API for credentials
    /// and the connection probe.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let api = Arc::new(OctoPrintApi::new(&config.base_url, &config.api_key)?);
        Self::with_collaborators(config, api.clone(), api, Arc::new(SystemClock))
    }

    /// Build a synchronizer with explicit collaborators.
    pub fn with_collaborators(
        config: SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
        probe: Arc<dyn ConnectionProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SyncError> {
        let client = OctoPrintClient::new(&config.base_url)?;
        let hub = Arc::new(SubscriptionHub::new(config.layer_progress_enabled));
        let (ready, _) = watch::channel(false);

        Ok(Self {
            config,
            client,
            credentials,
            probe,
            clock,
            hub,
            policy: ReconnectPolicy::default(),
            ready,
            started: AtomicBool::new(false),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the reconnect policy. Only effective before [`connect`](Self::connect).
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start the connection task (once) and wait for the server to confirm
    /// the first session.
    ///
    /// Later calls, and calls after a reconnect, resolve as soon as the
    /// first confirmation has happened. Fails only if the synchronizer is
    /// shut down before that.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SyncError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move {
                let url = this.client.ws_url();
                tracing::info!(url = %url, "Starting OctoPrint connection task");
                this.run_connection_loop().await;
                tracing::info!("OctoPrint connection task exited");
            });
            *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        }

        let mut ready = self.ready.subscribe();
        let confirmed = tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = ready.wait_for(|ready| *ready) => result.is_ok(),
        };

        if confirmed {
            Ok(())
        } else {
            Err(SyncError::ShutDown)
        }
    }

    /// Whether the server has confirmed a session at least once.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn printer_status(&self) -> PrinterStatus {
        self.hub.printer_status()
    }

    pub fn job_status(&self) -> JobStatus {
        self.hub.job_status()
    }

    pub fn subscribe_printer_status(&self) -> ReplaySubscription<PrinterStatus> {
        self.hub.subscribe_printer_status()
    }

    pub fn subscribe_job_status(&self) -> ReplaySubscription<JobStatus> {
        self.hub.subscribe_job_status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PrinterEvent> {
        self.hub.subscribe_events()
    }

    /// Stop the connection task and close the socket.
    ///
    /// Waits up to 5 seconds for the task to exit, then aborts it.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down OctoPrint synchronizer");
        self.cancel.cancel();

        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Connection task did not stop in time, aborting it");
                handle.abort();
            }
        }

        tracing::info!("OctoPrint synchronizer shut down");
    }

    // ---- connection task ----

    /// Core connection loop: reset -> connect -> process frames -> repeat.
    ///
    /// Runs until the cancellation token is triggered.
    async fn run_connection_loop(&self) {
        let mut dispatcher = FrameDispatcher::new(
            &self.config,
            Arc::clone(&self.clock),
            Arc::clone(&self.hub),
        );
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            dispatcher.reset();

            let Some(conn) = connect_with_backoff(
                &self.client,
                self.credentials.as_ref(),
                self.config.throttle,
                &mut backoff,
                &self.cancel,
            )
            .await
            else {
                return;
            };

            let acknowledged = self.run_session(conn, &mut dispatcher, &mut backoff).await;

            if self.cancel.is_cancelled() {
                return;
            }

            if acknowledged {
                tracing::info!("OctoPrint connection lost, reconnecting");
            } else {
                // Closed before the handshake completed: treat as a failed attempt.
                let delay = backoff.next_delay();
                tracing::warn!(
                    delay_ms = delay.as_millis() as u64,
                    "OctoPrint socket closed before the session was confirmed",
                );
                if !sleep_or_cancel(delay, &self.cancel).await {
                    return;
                }
            }
        }
    }

    /// Process frames until the socket drops or the task is cancelled.
    ///
    /// REST calls triggered by frames (the connection probe and the
    /// credential fetch for `reauth`) run as separate tasks so frames keep
    /// flowing while they are in flight. Their results are applied here, on
    /// the single writer.
    ///
    /// Returns whether the server confirmed this session.
    async fn run_session(
        &self,
        mut conn: OctoPrintConnection,
        dispatcher: &mut FrameDispatcher,
        backoff: &mut Backoff,
    ) -> bool {
        let mut acknowledged = false;
        // Dropping the set aborts calls still in flight.
        let mut calls: JoinSet<SessionCall> = JoinSet::new();

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => SessionStep::Cancelled,
                msg = conn.ws_stream.next() => SessionStep::Frame(msg),
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    SessionStep::Call(joined)
                }
            };

            let msg = match step {
                SessionStep::Cancelled => {
                    conn.close().await;
                    return acknowledged;
                }
                SessionStep::Call(Ok(call)) => {
                    if let Err(e) = self.apply_call(call, &mut conn, dispatcher).await {
                        tracing::warn!(error = %e, "Re-authentication failed, dropping socket");
                        conn.close().await;
                        return acknowledged;
                    }
                    continue;
                }
                SessionStep::Call(Err(e)) => {
                    tracing::error!(error = %e, "Session call task failed");
                    continue;
                }
                SessionStep::Frame(msg) => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => match dispatcher.handle_text(&text) {
                    FrameOutcome::Reauthenticate => {
                        tracing::info!("Server requested re-authentication");
                        let credentials = Arc::clone(&self.credentials);
                        calls.spawn(async move {
                            SessionCall::Credentials(credentials.credentials().await)
                        });
                    }
                    FrameOutcome::Connected(info) => {
                        tracing::info!(
                            version = ?info.version,
                            display_version = ?info.display_version,
                            "OctoPrint session confirmed",
                        );
                        if !acknowledged {
                            acknowledged = true;
                            backoff.reset();
                            self.ready.send_replace(true);
                        }
                        let probe = Arc::clone(&self.probe);
                        calls.spawn(async move {
                            SessionCall::Probe(probe.connection_state().await)
                        });
                    }
                    FrameOutcome::Updated | FrameOutcome::Ignored => {}
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "OctoPrint socket closed");
                    return acknowledged;
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring binary frame");
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "OctoPrint socket receive error");
                    return acknowledged;
                }
                None => {
                    tracing::info!("OctoPrint socket stream ended");
                    return acknowledged;
                }
            }
        }
    }

    /// Apply the result of a finished session call.
    ///
    /// Only a failed re-authentication is an error; it ends the session.
    async fn apply_call(
        &self,
        call: SessionCall,
        conn: &mut OctoPrintConnection,
        dispatcher: &mut FrameDispatcher,
    ) -> Result<(), ConnectError> {
        match call {
            SessionCall::Credentials(result) => {
                conn.authenticate(&result?).await?;
            }
            SessionCall::Probe(Ok(state)) if state.is_closed() => {
                tracing::info!(state = %state.state, "Printer is not connected to OctoPrint");
                dispatcher.observe_event(RAW_DISCONNECTED);
            }
            SessionCall::Probe(Ok(state)) => {
                tracing::debug!(state = %state.state, "Printer connection state");
            }
            SessionCall::Probe(Err(e)) => {
                tracing::warn!(error = %e, "Failed to query printer connection state");
            }
        }
        Ok(())
    }
}

/// REST call started from within a session.
enum SessionCall {
    /// Fresh credentials requested by a `reauth` frame.
    Credentials(Result<SessionCredentials, OctoPrintApiError>),
    /// Printer connection state checked after `connected`.
    Probe(Result<ConnectionState, OctoPrintApiError>),
}

enum SessionStep {
    Cancelled,
    Frame(Option<Result<Message, WsError>>),
    Call(Result<SessionCall, JoinError>),
}

/// Errors surfaced by [`OctoPrintSync`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The configured server URL cannot be used for the socket.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The REST client could not be built.
    #[error(transparent)]
    Api(#[from] OctoPrintApiError),

    /// The synchronizer was shut down before a session was confirmed.
    #[error("Synchronizer shut down")]
    ShutDown,
}
