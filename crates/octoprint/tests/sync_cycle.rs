//! End-to-end tests for the OctoPrint synchronizer against an in-process
//! WebSocket server.
//!
//! The server side is driven step by step from each test: accept, read the
//! `auth` frame, push frames, drop the socket. Credentials and the
//! connection probe are in-memory fakes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use octosync_core::clock::FixedClock;
use octosync_core::config::SyncConfig;
use octosync_core::printer::MachineState;
use octosync_core::printer_event::PrinterEvent;
use octosync_core::types::SessionCredentials;
use octosync_octoprint::api::{
    ConnectionProbe, ConnectionState, CredentialProvider, OctoPrintApiError,
};
use octosync_octoprint::hub::ReplaySubscription;
use octosync_octoprint::manager::OctoPrintSync;
use octosync_octoprint::reconnect::ReconnectPolicy;

const WAIT: Duration = Duration::from_secs(5);

const PRINTING_FRAME: &str = r#"{"current":{
    "state":{"text":"Printing"},
    "temps":[{"bed":{"actual":60.2,"target":60},"tool0":{"actual":214.6,"target":215}}],
    "job":{"file":{"name":"bracket.gcode","display":"bracket.gcode","path":"parts/bracket.gcode","origin":"local"},
           "estimatedPrintTime":3600},
    "progress":{"completion":25.0,"printTime":900,"printTimeLeft":2700}
}}"#;

type ServerSocket = WebSocketStream<TcpStream>;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Hands out `pi:session-N`, counting up on every call.
#[derive(Default)]
struct CountingCredentials {
    calls: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn credentials(&self) -> Result<SessionCredentials, OctoPrintApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionCredentials::new("pi", format!("session-{n}")))
    }
}

/// Succeeds once, then never answers: a server that hangs on re-login.
#[derive(Default)]
struct StallingCredentials {
    calls: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for StallingCredentials {
    async fn credentials(&self) -> Result<SessionCredentials, OctoPrintApiError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(SessionCredentials::new("pi", "session-1"));
        }
        std::future::pending().await
    }
}

struct FixedProbe(&'static str);

#[async_trait]
impl ConnectionProbe for FixedProbe {
    async fn connection_state(&self) -> Result<ConnectionState, OctoPrintApiError> {
        Ok(ConnectionState::new(self.0))
    }
}

/// Connection-state query that never answers.
struct UnresponsiveConnectionState;

#[async_trait]
impl ConnectionProbe for UnresponsiveConnectionState {
    async fn connection_state(&self) -> Result<ConnectionState, OctoPrintApiError> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(addr: SocketAddr) -> SyncConfig {
    SyncConfig::new(format!("http://{addr}"), "test-key")
}

fn build(
    config: SyncConfig,
    credentials: Arc<dyn CredentialProvider>,
    probe: Arc<dyn ConnectionProbe>,
) -> OctoPrintSync {
    let now = NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap();
    OctoPrintSync::with_collaborators(config, credentials, probe, Arc::new(FixedClock(now)))
        .unwrap()
}

fn synchronizer(config: SyncConfig, probe_state: &'static str) -> Arc<OctoPrintSync> {
    Arc::new(build(
        config,
        Arc::new(CountingCredentials::default()),
        Arc::new(FixedProbe(probe_state)),
    ))
}

fn start(sync: &Arc<OctoPrintSync>) {
    let sync = Arc::clone(sync);
    tokio::spawn(async move { sync.connect().await });
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("timed out waiting for client")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_text(server: &mut ServerSocket) -> String {
    loop {
        let msg = timeout(WAIT, server.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the socket")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

async fn push(server: &mut ServerSocket, frame: &str) {
    server.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn wait_for<T: Clone>(
    subscription: &mut ReplaySubscription<T>,
    predicate: impl Fn(&T) -> bool,
) -> T {
    timeout(WAIT, async {
        loop {
            let value = subscription.recv().await.unwrap();
            if predicate(&value) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for status")
}

/// Accept the client, check its auth frame, and close before confirming.
///
/// Returns when the client was accepted.
async fn reject(listener: &TcpListener, expected_auth: &str) -> Instant {
    let mut server = accept(listener).await;
    let accepted = Instant::now();
    assert_eq!(next_text(&mut server).await, expected_auth);
    server.close(None).await.unwrap();
    accepted
}

/// Wait until the client closes its end of the socket.
async fn wait_for_client_close(server: &mut ServerSocket) {
    timeout(WAIT, async {
        loop {
            match server.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("client kept the socket open");
}

/// Accept the client, check its auth frame and confirm the session.
async fn handshake(listener: &TcpListener, expected_auth: &str) -> ServerSocket {
    let mut server = accept(listener).await;
    assert_eq!(next_text(&mut server).await, expected_auth);
    push(&mut server, r#"{"connected":{"version":"1.10.0","display_version":"1.10.0"}}"#).await;
    server
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// `connect()` resolves only after the server's `connected` frame.
#[tokio::test]
async fn connect_resolves_after_acknowledgment() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = synchronizer(config(listener.local_addr().unwrap()), "Operational");

    let connect = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });

    let mut server = accept(&listener).await;
    assert_eq!(next_text(&mut server).await, r#"{"auth":"pi:session-1"}"#);
    assert!(!sync.is_ready());

    push(&mut server, r#"{"connected":{}}"#).await;
    timeout(WAIT, connect).await.unwrap().unwrap().unwrap();
    assert!(sync.is_ready());

    // Already confirmed: resolves immediately.
    timeout(WAIT, sync.connect()).await.unwrap().unwrap();

    sync.shutdown().await;
}

/// The throttle factor is sent right after authentication.
#[tokio::test]
async fn throttle_follows_auth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = config(listener.local_addr().unwrap());
    config.throttle = Some(2);
    let sync = synchronizer(config, "Operational");

    tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });

    let mut server = accept(&listener).await;
    assert_eq!(next_text(&mut server).await, r#"{"auth":"pi:session-1"}"#);
    assert_eq!(next_text(&mut server).await, r#"{"throttle":2}"#);

    sync.shutdown().await;
}

/// A `current` frame updates both records and infers PRINTING; a later
/// pause event flows through without touching the printer status.
#[tokio::test]
async fn frames_update_status_and_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = synchronizer(config(listener.local_addr().unwrap()), "Operational");
    let mut printer = sync.subscribe_printer_status();
    let mut job = sync.subscribe_job_status();
    let mut events = sync.subscribe_events();

    tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });
    let mut server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;

    push(&mut server, PRINTING_FRAME).await;

    let status = wait_for(&mut printer, |s| s.machine_state == MachineState::Printing).await;
    assert_eq!(status.bed.current, 60);
    assert_eq!(status.extruder.current, 215);
    assert_eq!(status.extruder.target, 215);

    let job_status = wait_for(&mut job, |j| j.file_name == "bracket").await;
    assert_eq!(job_status.full_path, "/local/parts/bracket.gcode");
    assert_eq!(job_status.progress_percent, 25);
    assert_eq!(job_status.estimated_end_clock_time.as_deref(), Some("12:45"));

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, PrinterEvent::Printing);

    push(&mut server, r#"{"event":{"type":"PrintPaused","payload":{}}}"#).await;
    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, PrinterEvent::Paused);
    assert_eq!(sync.printer_status(), status);

    sync.shutdown().await;
}

/// A `reauth` frame is answered with freshly fetched credentials.
#[tokio::test]
async fn reauth_resends_fresh_credentials() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = synchronizer(config(listener.local_addr().unwrap()), "Operational");

    tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });
    let mut server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;

    push(&mut server, r#"{"reauth":true}"#).await;
    assert_eq!(next_text(&mut server).await, r#"{"auth":"pi:session-2"}"#);

    sync.shutdown().await;
}

/// Losing the socket resets both records, reconnects with new
/// credentials, and keeps the last event.
#[tokio::test]
async fn dropped_socket_resets_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = synchronizer(config(listener.local_addr().unwrap()), "Operational");
    let mut printer = sync.subscribe_printer_status();
    let mut events = sync.subscribe_events();

    tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });
    let mut server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;
    push(&mut server, PRINTING_FRAME).await;
    wait_for(&mut printer, |s| s.machine_state == MachineState::Printing).await;
    assert_eq!(
        timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        PrinterEvent::Printing
    );

    server.close(None).await.unwrap();
    drop(server);

    let reset = wait_for(&mut printer, |s| s.machine_state == MachineState::Connecting).await;
    assert_eq!(reset.bed.current, 0);
    assert_eq!(sync.job_status().file_name, "");

    let mut server = handshake(&listener, r#"{"auth":"pi:session-2"}"#).await;

    // Last event is still PRINTING, so a printing frame infers nothing new.
    push(&mut server, PRINTING_FRAME).await;
    wait_for(&mut printer, |s| s.machine_state == MachineState::Printing).await;
    assert!(events.try_recv().is_err());

    sync.shutdown().await;
}

/// The connection probe reports a closed printer link: CLOSED is emitted.
#[tokio::test]
async fn closed_printer_link_emits_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = synchronizer(config(listener.local_addr().unwrap()), "Closed");
    let mut events = sync.subscribe_events();

    tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.connect().await }
    });
    let _server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, PrinterEvent::Closed);

    sync.shutdown().await;
}

/// A connection-state query that never answers does not hold up frames, and
/// shutdown still closes the socket promptly.
#[tokio::test]
async fn stuck_connection_query_does_not_block_frames_or_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = Arc::new(build(
        config(listener.local_addr().unwrap()),
        Arc::new(CountingCredentials::default()),
        Arc::new(UnresponsiveConnectionState),
    ));
    let mut printer = sync.subscribe_printer_status();

    start(&sync);
    let mut server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;

    push(&mut server, r#"{"current":{"state":{"text":"Printing"}}}"#).await;
    wait_for(&mut printer, |s| s.machine_state == MachineState::Printing).await;

    timeout(Duration::from_secs(2), sync.shutdown())
        .await
        .expect("shutdown waited on the connection-state query");
    wait_for_client_close(&mut server).await;
}

/// A re-login that never completes does not hold up frames either.
#[tokio::test]
async fn stalled_reauth_does_not_block_frames_or_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = Arc::new(build(
        config(listener.local_addr().unwrap()),
        Arc::new(StallingCredentials::default()),
        Arc::new(FixedProbe("Operational")),
    ));
    let mut printer = sync.subscribe_printer_status();

    start(&sync);
    let mut server = handshake(&listener, r#"{"auth":"pi:session-1"}"#).await;

    push(&mut server, r#"{"reauth":true}"#).await;
    push(&mut server, r#"{"current":{"state":{"text":"Paused"}}}"#).await;
    wait_for(&mut printer, |s| s.machine_state == MachineState::Paused).await;

    timeout(Duration::from_secs(2), sync.shutdown())
        .await
        .expect("shutdown waited on the credential fetch");
    wait_for_client_close(&mut server).await;
}

/// Sockets closed before `connected` walk the reconnect ladder; a
/// confirmed session starts it over.
#[tokio::test]
async fn unconfirmed_sessions_back_off_until_acknowledged() {
    let short = Duration::from_millis(20);
    let long = Duration::from_millis(400);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sync = build(
        config(listener.local_addr().unwrap()),
        Arc::new(CountingCredentials::default()),
        Arc::new(FixedProbe("Operational")),
    )
    .with_policy(ReconnectPolicy {
        short_delay: short,
        short_attempts: 2,
        long_delay: long,
    });
    let sync = Arc::new(sync);

    start(&sync);

    let mut accepted = Vec::new();
    for n in 1..=4 {
        let auth = format!(r#"{{"auth":"pi:session-{n}"}}"#);
        accepted.push(reject(&listener, &auth).await);
    }
    let mut server = handshake(&listener, r#"{"auth":"pi:session-5"}"#).await;
    accepted.push(Instant::now());

    let gaps: Vec<Duration> = accepted.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert!(gaps[0] >= short && gaps[0] < long, "first gap {:?}", gaps[0]);
    assert!(gaps[1] >= short && gaps[1] < long, "second gap {:?}", gaps[1]);
    assert!(gaps[2] >= long, "third gap {:?}", gaps[2]);
    assert!(gaps[3] >= long, "fourth gap {:?}", gaps[3]);

    // A confirmed session that drops reconnects without waiting.
    timeout(WAIT, sync.connect()).await.unwrap().unwrap();
    server.close(None).await.unwrap();
    drop(server);
    let dropped = Instant::now();
    let reconnected = reject(&listener, r#"{"auth":"pi:session-6"}"#).await;
    assert!(reconnected - dropped < long, "reconnect took {:?}", reconnected - dropped);

    // The ladder was reset: the next failure waits the short delay again.
    let retried = reject(&listener, r#"{"auth":"pi:session-7"}"#).await;
    let gap = retried - reconnected;
    assert!(gap >= short && gap < long, "gap after reset {gap:?}");

    sync.shutdown().await;
}
