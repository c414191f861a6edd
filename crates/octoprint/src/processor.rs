//! Frame dispatch.
//!
//! [`FrameDispatcher`] is the single writer of the session state. It takes
//! one text frame at a time, classifies it via [`parse_frame`], updates the
//! normalizers and the event engine, and publishes every change to the
//! [`SubscriptionHub`]. Transport concerns (re-authentication, handshake
//! bookkeeping) are returned as a [`FrameOutcome`] for the session loop in
//! [`manager`](crate::manager) to act on.

use std::sync::Arc;

use octosync_core::clock::Clock;
use octosync_core::config::SyncConfig;
use octosync_core::printer_event::PrinterEvent;

use crate::events::EventEngine;
use crate::hub::SubscriptionHub;
use crate::job_status::JobStatusNormalizer;
use crate::messages::{
    parse_frame, ConnectedData, CurrentData, LayerProgressData, PluginData, RawFrame,
};
use crate::printer_status::{implied_event, PrinterStatusNormalizer};

/// What the session loop has to do after a frame was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// State was updated and published.
    Updated,
    /// Nothing changed.
    Ignored,
    /// The server asked for a fresh `auth` message.
    Reauthenticate,
    /// The server confirmed the session is ready.
    Connected(ConnectedData),
}

pub struct FrameDispatcher {
    printer: PrinterStatusNormalizer,
    job: JobStatusNormalizer,
    events: EventEngine,
    hub: Arc<SubscriptionHub>,
    layer_progress_enabled: bool,
}

impl FrameDispatcher {
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>, hub: Arc<SubscriptionHub>) -> Self {
        Self {
            printer: PrinterStatusNormalizer::new(config.layer_progress_enabled),
            job: JobStatusNormalizer::new(config, clock),
            events: EventEngine::new(),
            hub,
            layer_progress_enabled: config.layer_progress_enabled,
        }
    }

    pub fn last_event(&self) -> PrinterEvent {
        self.events.last()
    }

    /// Start a new connection cycle: both records go back to their
    /// "connecting" defaults and are published. The last event is kept.
    pub fn reset(&mut self) {
        self.hub.publish_printer_status(self.printer.reset());
        self.hub.publish_job_status(self.job.reset());
    }

    /// Parse and dispatch one socket text frame.
    ///
    /// Malformed frames are logged and dropped.
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        match parse_frame(text) {
            Ok(Some(frame)) => self.dispatch(frame),
            Ok(None) => {
                tracing::trace!("Dropping unhandled OctoPrint frame");
                FrameOutcome::Ignored
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_message = %text,
                    "Failed to parse OctoPrint frame",
                );
                FrameOutcome::Ignored
            }
        }
    }

    pub fn dispatch(&mut self, frame: RawFrame) -> FrameOutcome {
        match frame {
            RawFrame::Current(data) => {
                self.handle_current(&data);
                FrameOutcome::Updated
            }
            RawFrame::Event(data) => {
                if self.observe_event(&data.kind) {
                    FrameOutcome::Updated
                } else {
                    FrameOutcome::Ignored
                }
            }
            RawFrame::Plugin(data) => self.handle_plugin(&data),
            RawFrame::Reauth => FrameOutcome::Reauthenticate,
            RawFrame::Connected(data) => FrameOutcome::Connected(data),
        }
    }

    /// Feed a raw event type through the transition table and publish the
    /// result. Returns whether a transition happened.
    pub fn observe_event(&mut self, raw_type: &str) -> bool {
        match self.events.observe(raw_type) {
            Some(event) => {
                self.hub.publish_event(event);
                true
            }
            None => false,
        }
    }

    // ---- individual frame handlers ----

    fn handle_current(&mut self, data: &CurrentData) {
        let status = self.printer.apply_current(data);

        // Joining a printer mid-job: no start event was ever observed.
        if self.events.last() == PrinterEvent::Unknown {
            if let Some(raw_type) = implied_event(status.machine_state) {
                tracing::debug!(raw_type, "Synthesizing event from printer state");
                self.observe_event(raw_type);
            }
        }

        self.hub.publish_printer_status(status);
        self.hub.publish_job_status(self.job.apply_current(data));
    }

    fn handle_plugin(&mut self, data: &PluginData) -> FrameOutcome {
        if !self.layer_progress_enabled || !data.is_layer_progress() {
            tracing::trace!(plugin = %data.plugin, "Dropping plugin message");
            return FrameOutcome::Ignored;
        }

        let Some(progress) = LayerProgressData::from_plugin(&data.data) else {
            tracing::trace!(plugin = %data.plugin, "Dropping malformed layer progress payload");
            return FrameOutcome::Ignored;
        };

        self.hub
            .publish_printer_status(self.printer.apply_layer_progress(&progress));
        self.hub
            .publish_job_status(self.job.apply_layer_progress(&progress));
        FrameOutcome::Updated
    }
}
