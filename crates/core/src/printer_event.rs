//! Discrete printer lifecycle events and the transition table that derives
//! them from raw server event types.
//!
//! The table is the only place raw event names are interpreted. It is used
//! both for explicit `event` frames and for events synthesized from state
//! transitions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw event type names
// ---------------------------------------------------------------------------

pub const RAW_PRINT_STARTED: &str = "PrintStarted";
pub const RAW_PRINT_RESUMED: &str = "PrintResumed";
pub const RAW_PRINT_PAUSED: &str = "PrintPaused";
pub const RAW_PRINT_FAILED: &str = "PrintFailed";
pub const RAW_PRINT_DONE: &str = "PrintDone";
pub const RAW_PRINT_CANCELLED: &str = "PrintCancelled";
pub const RAW_CONNECTED: &str = "Connected";
pub const RAW_DISCONNECTED: &str = "Disconnected";
pub const RAW_ERROR: &str = "Error";

// ---------------------------------------------------------------------------
// PrinterEvent
// ---------------------------------------------------------------------------

/// Last known lifecycle event of the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrinterEvent {
    /// Nothing recognized has been observed yet.
    #[default]
    Unknown,
    Connected,
    Printing,
    Paused,
    Idle,
    Closed,
}

/// Map a raw server event type to the event it produces.
///
/// Returns `None` for types that do not change the lifecycle.
pub fn transition(raw_type: &str) -> Option<PrinterEvent> {
    match raw_type {
        RAW_PRINT_STARTED | RAW_PRINT_RESUMED => Some(PrinterEvent::Printing),
        RAW_PRINT_PAUSED => Some(PrinterEvent::Paused),
        RAW_PRINT_FAILED | RAW_PRINT_DONE | RAW_PRINT_CANCELLED => Some(PrinterEvent::Idle),
        RAW_CONNECTED => Some(PrinterEvent::Connected),
        RAW_DISCONNECTED | RAW_ERROR => Some(PrinterEvent::Closed),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
