//! `octosync-monitor` -- follows one OctoPrint server and logs its status.
//!
//! Connects to the server's push socket, keeps printer status, job status
//! and lifecycle events synchronized, and writes every update to the log
//! until interrupted with Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable                 | Required | Default | Description                                 |
//! |--------------------------|----------|---------|---------------------------------------------|
//! | `OCTOPRINT_URL`          | yes      | --      | Server base URL, e.g. `http://octopi.local` |
//! | `OCTOPRINT_API_KEY`      | yes      | --      | API key used for the passive login          |
//! | `LAYER_PROGRESS_ENABLED` | no       | `false` | Use the layer-progress plugin               |
//! | `FILAMENT_DIAMETER_MM`   | no       | `1.75`  | Filament diameter for weight estimates      |
//! | `FILAMENT_DENSITY`       | no       | `1.25`  | Filament density in g/cm³                   |
//! | `SOCKET_THROTTLE`        | no       | --      | Push-rate throttle factor                   |
//! | `LOG_FORMAT`             | no       | `text`  | `json` for machine-readable logs            |

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use octosync_core::config::SyncConfig;
use octosync_octoprint::manager::OctoPrintSync;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "octosync_monitor=info,octosync_octoprint=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = SyncConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        url = %config.base_url,
        layer_progress_enabled = config.layer_progress_enabled,
        throttle = ?config.throttle,
        "Starting octosync-monitor",
    );

    let sync = match OctoPrintSync::new(config) {
        Ok(sync) => Arc::new(sync),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create synchronizer");
            std::process::exit(1);
        }
    };

    spawn_reporters(&sync);

    tokio::select! {
        result = sync.connect() => match result {
            Ok(()) => tracing::info!("Connected to OctoPrint"),
            Err(e) => tracing::error!(error = %e, "Failed to connect"),
        },
        _ = tokio::signal::ctrl_c() => {
            sync.shutdown().await;
            return;
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    sync.shutdown().await;
}

/// Log every update of the three synchronized streams.
fn spawn_reporters(sync: &OctoPrintSync) {
    let mut printer = Box::pin(sync.subscribe_printer_status().into_stream());
    tokio::spawn(async move {
        while let Some(status) = printer.next().await {
            tracing::info!(
                state = status.machine_state.as_label(),
                bed = status.bed.current,
                bed_target = status.bed.target,
                extruder = status.extruder.current,
                extruder_target = status.extruder.target,
                fan_speed = status.fan_speed,
                "Printer status",
            );
        }
    });

    let mut job = Box::pin(sync.subscribe_job_status().into_stream());
    tokio::spawn(async move {
        while let Some(status) = job.next().await {
            tracing::info!(
                file = %status.file_name,
                progress = status.progress_percent,
                layer = ?status.layer_height,
                filament_g = status.filament_weight,
                elapsed = %status.elapsed_time.value,
                remaining = %status.remaining_time.value,
                ends_at = ?status.estimated_end_clock_time,
                "Job status",
            );
        }
    });

    let mut events = sync.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "Printer event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event reporter lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
