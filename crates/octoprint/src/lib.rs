//! OctoPrint push-socket client library.
//!
//! Keeps a normalized view of one OctoPrint server in sync: typed frame
//! parsing, socket connection management with re-authentication and
//! backoff, REST wrappers for credentials and the connection probe, status
//! normalizers, event inference, and a subscription hub for consumers.
//!
//! The entry point is [`manager::OctoPrintSync`].

pub mod api;
pub mod client;
pub mod events;
pub mod hub;
pub mod job_status;
pub mod manager;
pub mod messages;
pub mod printer_status;
pub mod processor;
pub mod reconnect;
