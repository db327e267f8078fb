//! Core domain logic for school attendance reconciliation and monthly recaps.
//! This crate is the single source of truth for attendance invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::attendance::{
    derive_record_id, resolve_record_id, AttendanceEvent, AttendanceKey, AttendanceStatus,
    RecordId,
};
pub use model::person::{Person, PersonId, PersonKind, StudentStatus};
pub use model::recap::{MonthlyRecap, RecapDetailRow, StatusCounts, YearMonth, YearMonthError};
pub use model::schedule::{is_class_option, weekday_name, ScheduleSlot, Subject, CLASS_OPTIONS};
pub use repo::document_store::{
    Document, DocumentStore, FeedEvent, Fields, Predicate, StoreError, StoreResult,
    Subscription, SubscriptionId, WriteMode, MAX_IN_VALUES,
};
pub use repo::sqlite_store::SqliteDocumentStore;
pub use service::access::{AccessControl, WritePrivilege};
pub use service::catalog::{CatalogCounts, CatalogError, EntityCatalog, EntityType};
pub use service::live_view::{AttendanceFilter, LiveAttendanceView, ViewError, ViewSelection};
pub use service::monthly_aggregator::{
    AggregationError, AggregatorState, MonthlyAggregator, RecapOptions,
};
pub use service::notify::{CollectingNotifier, LogNotifier, Notice, NoticeLevel, Notifier};
pub use service::status_writer::{StatusChange, StatusTransitionWriter, WriteError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
