//! SQLite persistence layer for mdcheck.
//!
//! The store exclusively owns record lifetime. Every read or write runs
//! inside a session-scoped transaction ([`Store::with_session`]) that
//! commits on success and rolls back on any error path.

mod models;
mod store;

pub use models::{
    AuditEntry, CacheEntryStats, Checkpoint, MaintenanceFlag, NewRecommendation, NewValidation,
    OperationStats, PerformanceSample, Recommendation, RecommendationStatus, Severity,
    ValidationRecord, ValidationStatus, Workflow, WorkflowState, WorkflowType, ts_millis,
};
pub use store::{
    AuditFilter, RecommendationFilter, Store, StoreError, ValidationFilter, WorkflowFilter,
};
