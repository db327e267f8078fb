//! Document store contract and persistence implementations.
//!
//! # Responsibility
//! - Define the generic document store consumed by services.
//! - Keep SQL and wire-format details away from service orchestration.
//!
//! # Invariants
//! - Services only talk to storage through `DocumentStore`.
//! - Collection and field names of the school dataset live in `records`.

pub mod document_store;
pub mod records;
pub mod sqlite_store;
