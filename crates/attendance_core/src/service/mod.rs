//! Attendance use-case services.
//!
//! # Responsibility
//! - Hold session state (catalog, live view) behind read-only accessors.
//! - Orchestrate document store calls into status writes and monthly recaps.
//! - Keep rendering layers decoupled from storage details.

pub mod access;
pub mod catalog;
pub mod live_view;
pub mod monthly_aggregator;
pub mod notify;
pub mod status_writer;
