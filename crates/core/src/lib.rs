//! Domain model for the OctoPrint status synchronizer.
//!
//! Pure types and functions shared by the socket layer and consumers:
//!
//! - [`printer`] -- [`PrinterStatus`](printer::PrinterStatus) and the
//!   [`MachineState`](printer::MachineState) label mapping.
//! - [`job`] -- [`JobStatus`](job::JobStatus) and its display units.
//! - [`printer_event`] -- lifecycle events and the raw-type transition table.
//! - [`conversions`] -- rounding, duration, filament and clock formatting.
//! - [`config`] -- [`SyncConfig`](config::SyncConfig) loaded from the environment.
//!
//! Nothing here performs I/O.

pub mod clock;
pub mod config;
pub mod conversions;
pub mod error;
pub mod job;
pub mod printer;
pub mod printer_event;
pub mod types;
