//! Event inference engine.
//!
//! Holds the last recognized [`PrinterEvent`] and advances it through the
//! transition table in [`octosync_core::printer_event`]. Explicit `event`
//! frames and events synthesized from status transitions both go through
//! [`EventEngine::observe`].

use octosync_core::printer_event::{transition, PrinterEvent};

#[derive(Debug, Default)]
pub struct EventEngine {
    last: PrinterEvent,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recognized event. Survives reconnects.
    pub fn last(&self) -> PrinterEvent {
        self.last
    }

    /// Feed a raw server event type.
    ///
    /// Returns the new event when `raw_type` is recognized; the caller
    /// publishes it. Unrecognized types leave the engine untouched.
    pub fn observe(&mut self, raw_type: &str) -> Option<PrinterEvent> {
        let Some(next) = transition(raw_type) else {
            tracing::trace!(raw_type, "Ignoring unmapped printer event");
            return None;
        };

        tracing::debug!(
            raw_type,
            from = ?self.last,
            to = ?next,
            "Printer event transition",
        );
        self.last = next;
        Some(next)
    }
}
