//! Domain model for school attendance tracking.
//!
//! # Responsibility
//! - Define reference entities (persons, schedule slots, subjects).
//! - Define the attendance event, its logical key and derived record id.
//! - Define the derived monthly recap shape handed to report renderers.
//!
//! # Invariants
//! - The logical key `(slot, person, date)` is the only source of identity.
//! - Record ids are a pure function of the logical key unless a record
//!   already exists under another id.

pub mod attendance;
pub mod person;
pub mod recap;
pub mod schedule;
