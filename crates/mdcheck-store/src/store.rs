//! SQLite-backed store with session-scoped transactions.

use crate::models::{
    AuditEntry, CacheEntryStats, Checkpoint, MaintenanceFlag, NewRecommendation, NewValidation,
    OperationStats, Recommendation, RecommendationStatus, Severity, ValidationRecord,
    ValidationStatus, Workflow, WorkflowState, WorkflowType, ts_millis,
};
use chrono::{DateTime, Duration, Utc};
use mdcheck_utils::ids;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, params, params_from_iter};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

#[derive(Debug, Clone, Default)]
pub struct ValidationFilter {
    pub limit: usize,
    pub offset: usize,
    pub status: Option<ValidationStatus>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationFilter {
    pub validation_id: Option<String>,
    pub status: Option<RecommendationStatus>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub limit: usize,
    pub offset: usize,
    pub state: Option<WorkflowState>,
    pub workflow_type: Option<WorkflowType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub limit: usize,
    pub offset: usize,
    pub operation: Option<String>,
    pub user: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS validations (
    id                 TEXT PRIMARY KEY,
    file_path          TEXT NOT NULL,
    status             TEXT NOT NULL,
    severity           TEXT NOT NULL,
    rules_applied      TEXT NOT NULL DEFAULT '[]',
    validation_types   TEXT NOT NULL DEFAULT '[]',
    validation_results TEXT NOT NULL DEFAULT '{}',
    content            TEXT NOT NULL DEFAULT '',
    notes              TEXT NOT NULL DEFAULT '',
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recommendations (
    id               TEXT PRIMARY KEY,
    validation_id    TEXT NOT NULL REFERENCES validations(id) ON DELETE CASCADE,
    type             TEXT NOT NULL,
    title            TEXT NOT NULL DEFAULT '',
    description      TEXT NOT NULL DEFAULT '',
    scope            TEXT NOT NULL DEFAULT 'global',
    instruction      TEXT NOT NULL DEFAULT '',
    rationale        TEXT NOT NULL DEFAULT '',
    severity         TEXT NOT NULL DEFAULT 'medium',
    original_content TEXT,
    proposed_content TEXT,
    diff             TEXT,
    confidence       REAL NOT NULL DEFAULT 0,
    priority         INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'pending',
    reviewed_by      TEXT,
    reviewed_at      TEXT,
    review_notes     TEXT,
    applied_at       TEXT,
    applied_by       TEXT,
    metadata         TEXT NOT NULL DEFAULT '{}',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recommendations_validation
    ON recommendations(validation_id);

CREATE TABLE IF NOT EXISTS workflows (
    id               TEXT PRIMARY KEY,
    workflow_type    TEXT NOT NULL,
    state            TEXT NOT NULL,
    input_params     TEXT NOT NULL DEFAULT '{}',
    progress_percent REAL NOT NULL DEFAULT 0,
    current_step     INTEGER NOT NULL DEFAULT 0,
    total_steps      INTEGER NOT NULL DEFAULT 0,
    error_message    TEXT,
    metadata         TEXT NOT NULL DEFAULT '{}',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    completed_at     TEXT
);

CREATE TABLE IF NOT EXISTS audit_entries (
    id         TEXT PRIMARY KEY,
    operation  TEXT NOT NULL,
    user       TEXT,
    status     TEXT NOT NULL,
    details    TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS performance_samples (
    id          TEXT PRIMARY KEY,
    operation   TEXT NOT NULL,
    duration_ms REAL NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_performance_created
    ON performance_samples(created_at);

CREATE TABLE IF NOT EXISTS cache_entries (
    key           TEXT PRIMARY KEY,
    cache_type    TEXT NOT NULL,
    value         TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    last_accessed TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS maintenance_flags (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    enabled    INTEGER NOT NULL DEFAULT 0,
    reason     TEXT,
    enabled_by TEXT,
    enabled_at TEXT
);

CREATE TABLE IF NOT EXISTS checkpoints (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    metadata   TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
"#;

/// Relational store of validations, recommendations, workflows, and the
/// secondary audit/performance/cache entities.
pub struct Store {
    conn: Mutex<Connection>,
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn string_list_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let value = json_col(row, idx)?;
    Ok(value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default())
}

fn validation_from_row(row: &Row<'_>) -> rusqlite::Result<ValidationRecord> {
    Ok(ValidationRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        status: enum_col(row, 2)?,
        severity: enum_col(row, 3)?,
        rules_applied: string_list_col(row, 4)?,
        validation_types: string_list_col(row, 5)?,
        validation_results: json_col(row, 6)?,
        content: row.get(7)?,
        notes: row.get(8)?,
        created_at: ts_col(row, 9)?,
        updated_at: ts_col(row, 10)?,
    })
}

const VALIDATION_COLUMNS: &str = "id, file_path, status, severity, rules_applied, \
     validation_types, validation_results, content, notes, created_at, updated_at";

fn recommendation_from_row(row: &Row<'_>) -> rusqlite::Result<Recommendation> {
    Ok(Recommendation {
        id: row.get(0)?,
        validation_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        scope: row.get(5)?,
        instruction: row.get(6)?,
        rationale: row.get(7)?,
        severity: row.get(8)?,
        original_content: row.get(9)?,
        proposed_content: row.get(10)?,
        diff: row.get(11)?,
        confidence: row.get(12)?,
        priority: row.get(13)?,
        status: enum_col(row, 14)?,
        reviewed_by: row.get(15)?,
        reviewed_at: opt_ts_col(row, 16)?,
        review_notes: row.get(17)?,
        applied_at: opt_ts_col(row, 18)?,
        applied_by: row.get(19)?,
        metadata: json_col(row, 20)?,
        created_at: ts_col(row, 21)?,
        updated_at: ts_col(row, 22)?,
    })
}

const RECOMMENDATION_COLUMNS: &str = "id, validation_id, type, title, description, scope, \
     instruction, rationale, severity, original_content, proposed_content, diff, confidence, \
     priority, status, reviewed_by, reviewed_at, review_notes, applied_at, applied_by, \
     metadata, created_at, updated_at";

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<Workflow> {
    Ok(Workflow {
        id: row.get(0)?,
        workflow_type: enum_col(row, 1)?,
        state: enum_col(row, 2)?,
        input_params: json_col(row, 3)?,
        progress_percent: row.get(4)?,
        current_step: row.get(5)?,
        total_steps: row.get(6)?,
        error_message: row.get(7)?,
        metadata: json_col(row, 8)?,
        created_at: ts_col(row, 9)?,
        updated_at: ts_col(row, 10)?,
        completed_at: opt_ts_col(row, 11)?,
    })
}

const WORKFLOW_COLUMNS: &str = "id, workflow_type, state, input_params, progress_percent, \
     current_step, total_steps, error_message, metadata, created_at, updated_at, completed_at";

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction. Commit on `Ok`, roll back on `Err`.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            // Dropping the transaction rolls it back.
            Err(e) => Err(e),
        }
    }

    /// Cheap connectivity probe.
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Reclaim free pages. Must run outside any transaction.
    pub fn vacuum(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validations
    // ------------------------------------------------------------------

    pub fn create_validation(&self, new: NewValidation) -> Result<ValidationRecord, StoreError> {
        let now = Utc::now();
        let record = ValidationRecord {
            id: ids::new_id(),
            file_path: new.file_path,
            status: new.status.unwrap_or(ValidationStatus::Pending),
            severity: new.severity.unwrap_or(Severity::Info),
            rules_applied: new.rules_applied,
            validation_types: new.validation_types,
            validation_results: new.validation_results,
            content: new.content,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };

        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO validations (id, file_path, status, severity, rules_applied, \
                 validation_types, validation_results, content, notes, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.file_path,
                    record.status.to_string(),
                    record.severity.to_string(),
                    serde_json::to_string(&record.rules_applied)?,
                    serde_json::to_string(&record.validation_types)?,
                    serde_json::to_string(&record.validation_results)?,
                    record.content,
                    record.notes,
                    ts_millis::to_string(&record.created_at),
                    ts_millis::to_string(&record.updated_at),
                ],
            )?;
            Ok(())
        })?;

        debug!(id = %record.id, file = %record.file_path, "created validation");
        Ok(record)
    }

    pub fn get_validation(&self, id: &str) -> Result<Option<ValidationRecord>, StoreError> {
        self.with_session(|tx| {
            let sql = format!("SELECT {VALIDATION_COLUMNS} FROM validations WHERE id = ?1");
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query_map(params![id], validation_from_row)?;
            rows.next().transpose().map_err(StoreError::from)
        })
    }

    pub fn list_validations(
        &self,
        filter: &ValidationFilter,
    ) -> Result<(Vec<ValidationRecord>, usize), StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            values.push(status.to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(file_path) = &filter.file_path {
            values.push(file_path.clone());
            clauses.push(format!("file_path = ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        self.with_session(|tx| {
            let total: usize = tx.query_row(
                &format!("SELECT COUNT(*) FROM validations{where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get::<_, i64>(0),
            )? as usize;

            let sql = format!(
                "SELECT {VALIDATION_COLUMNS} FROM validations{where_sql} \
                 ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
                filter.limit, filter.offset
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), validation_from_row)?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((records, total))
        })
    }

    /// Validation history for one file, newest first.
    pub fn validations_for_file(
        &self,
        file_path: &str,
        limit: usize,
    ) -> Result<Vec<ValidationRecord>, StoreError> {
        self.with_session(|tx| {
            let sql = format!(
                "SELECT {VALIDATION_COLUMNS} FROM validations WHERE file_path = ?1 \
                 ORDER BY created_at DESC, id LIMIT {limit}"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params![file_path], validation_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
    }

    /// Partial update of notes and/or status; returns false when the id does
    /// not exist.
    pub fn update_validation(
        &self,
        id: &str,
        notes: Option<&str>,
        status: Option<ValidationStatus>,
    ) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let now = ts_millis::to_string(&Utc::now());
            let changed = match (notes, status) {
                (Some(notes), Some(status)) => tx.execute(
                    "UPDATE validations SET notes = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                    params![notes, status.to_string(), now, id],
                )?,
                (Some(notes), None) => tx.execute(
                    "UPDATE validations SET notes = ?1, updated_at = ?2 WHERE id = ?3",
                    params![notes, now, id],
                )?,
                (None, Some(status)) => tx.execute(
                    "UPDATE validations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.to_string(), now, id],
                )?,
                (None, None) => tx.execute(
                    "UPDATE validations SET updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    /// Write back the mutable fields of a loaded record, refreshing
    /// `updated_at`.
    pub fn save_validation(&self, record: &ValidationRecord) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute(
                "UPDATE validations SET file_path = ?1, status = ?2, severity = ?3, \
                 rules_applied = ?4, validation_types = ?5, validation_results = ?6, \
                 content = ?7, notes = ?8, updated_at = ?9 WHERE id = ?10",
                params![
                    record.file_path,
                    record.status.to_string(),
                    record.severity.to_string(),
                    serde_json::to_string(&record.rules_applied)?,
                    serde_json::to_string(&record.validation_types)?,
                    serde_json::to_string(&record.validation_results)?,
                    record.content,
                    record.notes,
                    ts_millis::to_string(&Utc::now()),
                    record.id,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_validation(&self, id: &str) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute("DELETE FROM validations WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Update status for all existing ids in one transaction.
    ///
    /// Missing ids become per-id error strings; found records get the new
    /// status, a refreshed `updated_at`, and `note` appended to notes when
    /// given. The whole batch commits once.
    pub fn update_validation_status_batch(
        &self,
        ids: &[String],
        status: ValidationStatus,
        note: Option<&str>,
    ) -> Result<(usize, Vec<String>), StoreError> {
        if ids.is_empty() {
            return Ok((0, Vec::new()));
        }

        self.with_session(|tx| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!("SELECT id FROM validations WHERE id IN ({placeholders})");
            let mut stmt = tx.prepare(&sql)?;
            let found: HashSet<String> = stmt
                .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            let errors: Vec<String> = ids
                .iter()
                .filter(|id| !found.contains(*id))
                .map(|id| format!("Validation {id} not found"))
                .collect();

            let now = ts_millis::to_string(&Utc::now());
            let mut updated = 0usize;
            for id in ids.iter().filter(|id| found.contains(*id)) {
                match note {
                    Some(note) => {
                        tx.execute(
                            "UPDATE validations SET status = ?1, updated_at = ?2, \
                             notes = CASE WHEN notes = '' THEN ?3 \
                                          ELSE notes || char(10) || ?3 END \
                             WHERE id = ?4",
                            params![status.to_string(), now, note, id],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "UPDATE validations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                            params![status.to_string(), now, id],
                        )?;
                    }
                }
                updated += 1;
            }

            Ok((updated, errors))
        })
    }

    pub fn count_validations_by_status(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        self.count_by_column("validations", "status")
    }

    // ------------------------------------------------------------------
    // Recommendations
    // ------------------------------------------------------------------

    pub fn create_recommendation(
        &self,
        new: NewRecommendation,
    ) -> Result<Recommendation, StoreError> {
        let now = Utc::now();
        let record = Recommendation {
            id: ids::new_id(),
            validation_id: new.validation_id,
            kind: new.kind,
            title: new.title,
            description: new.description,
            scope: new.scope,
            instruction: new.instruction,
            rationale: new.rationale,
            severity: new.severity,
            original_content: new.original_content,
            proposed_content: new.proposed_content,
            diff: new.diff,
            confidence: new.confidence,
            priority: new.priority,
            status: RecommendationStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            applied_at: None,
            applied_by: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO recommendations (id, validation_id, type, title, description, \
                 scope, instruction, rationale, severity, original_content, proposed_content, \
                 diff, confidence, priority, status, metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18)",
                params![
                    record.id,
                    record.validation_id,
                    record.kind,
                    record.title,
                    record.description,
                    record.scope,
                    record.instruction,
                    record.rationale,
                    record.severity,
                    record.original_content,
                    record.proposed_content,
                    record.diff,
                    record.confidence,
                    record.priority,
                    record.status.to_string(),
                    serde_json::to_string(&record.metadata)?,
                    ts_millis::to_string(&record.created_at),
                    ts_millis::to_string(&record.updated_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(record)
    }

    pub fn get_recommendation(&self, id: &str) -> Result<Option<Recommendation>, StoreError> {
        self.with_session(|tx| {
            let sql = format!("SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE id = ?1");
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query_map(params![id], recommendation_from_row)?;
            rows.next().transpose().map_err(StoreError::from)
        })
    }

    /// List in creation order (the apply default ordering).
    pub fn list_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(validation_id) = &filter.validation_id {
            values.push(validation_id.clone());
            clauses.push(format!("validation_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(kind) = &filter.kind {
            values.push(kind.clone());
            clauses.push(format!("type = ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        self.with_session(|tx| {
            let sql = format!(
                "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations{where_sql} \
                 ORDER BY created_at, id"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), recommendation_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
    }

    /// Transition a recommendation and stamp the matching timestamp:
    /// `reviewed_at` for approved/rejected, `applied_at` for applied.
    pub fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        review_notes: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let now = ts_millis::to_string(&Utc::now());
            let changed = match status {
                RecommendationStatus::Approved | RecommendationStatus::Rejected => tx.execute(
                    "UPDATE recommendations SET status = ?1, reviewed_at = ?2, \
                     review_notes = COALESCE(?3, review_notes), updated_at = ?2 WHERE id = ?4",
                    params![status.to_string(), now, review_notes, id],
                )?,
                RecommendationStatus::Applied => tx.execute(
                    "UPDATE recommendations SET status = ?1, applied_at = ?2, updated_at = ?2 \
                     WHERE id = ?3",
                    params![status.to_string(), now, id],
                )?,
                RecommendationStatus::Pending => tx.execute(
                    "UPDATE recommendations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.to_string(), now, id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    pub fn delete_recommendation(&self, id: &str) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute("DELETE FROM recommendations WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Delete every recommendation attached to a validation; returns the
    /// number removed.
    pub fn delete_recommendations_for(&self, validation_id: &str) -> Result<usize, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute(
                "DELETE FROM recommendations WHERE validation_id = ?1",
                params![validation_id],
            )?;
            Ok(changed)
        })
    }

    pub fn count_recommendations_by_status(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        self.count_by_column("recommendations", "status")
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    pub fn create_workflow(
        &self,
        workflow_type: WorkflowType,
        input_params: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Workflow, StoreError> {
        let now = Utc::now();
        let workflow = Workflow {
            id: ids::new_id(),
            workflow_type,
            state: WorkflowState::Pending,
            input_params,
            progress_percent: 0.0,
            current_step: 0,
            total_steps: 0,
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO workflows (id, workflow_type, state, input_params, \
                 progress_percent, current_step, total_steps, metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    workflow.id,
                    workflow.workflow_type.to_string(),
                    workflow.state.to_string(),
                    serde_json::to_string(&workflow.input_params)?,
                    workflow.progress_percent,
                    workflow.current_step,
                    workflow.total_steps,
                    serde_json::to_string(&workflow.metadata)?,
                    ts_millis::to_string(&workflow.created_at),
                    ts_millis::to_string(&workflow.updated_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(workflow)
    }

    pub fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
        self.with_session(|tx| {
            let sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1");
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query_map(params![id], workflow_from_row)?;
            rows.next().transpose().map_err(StoreError::from)
        })
    }

    pub fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<(Vec<Workflow>, usize), StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(state) = filter.state {
            values.push(state.to_string());
            clauses.push(format!("state = ?{}", values.len()));
        }
        if let Some(workflow_type) = filter.workflow_type {
            values.push(workflow_type.to_string());
            clauses.push(format!("workflow_type = ?{}", values.len()));
        }
        if let Some(after) = filter.created_after {
            values.push(ts_millis::to_string(&after));
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(before) = filter.created_before {
            values.push(ts_millis::to_string(&before));
            clauses.push(format!("created_at <= ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        self.with_session(|tx| {
            let total: usize = tx.query_row(
                &format!("SELECT COUNT(*) FROM workflows{where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get::<_, i64>(0),
            )? as usize;

            let sql = format!(
                "SELECT {WORKFLOW_COLUMNS} FROM workflows{where_sql} \
                 ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
                filter.limit, filter.offset
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), workflow_from_row)?;
            let workflows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((workflows, total))
        })
    }

    /// Transition workflow state. Terminal states stamp `completed_at`.
    pub fn set_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let terminal = matches!(
            state,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        );

        self.with_session(|tx| {
            let now = ts_millis::to_string(&Utc::now());
            let changed = if terminal {
                tx.execute(
                    "UPDATE workflows SET state = ?1, error_message = COALESCE(?2, error_message), \
                     updated_at = ?3, completed_at = ?3 WHERE id = ?4",
                    params![state.to_string(), error_message, now, id],
                )?
            } else {
                tx.execute(
                    "UPDATE workflows SET state = ?1, error_message = COALESCE(?2, error_message), \
                     updated_at = ?3 WHERE id = ?4",
                    params![state.to_string(), error_message, now, id],
                )?
            };
            Ok(changed > 0)
        })
    }

    pub fn update_workflow_progress(
        &self,
        id: &str,
        current_step: i64,
        total_steps: i64,
        progress_percent: f64,
    ) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute(
                "UPDATE workflows SET current_step = ?1, total_steps = ?2, \
                 progress_percent = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    current_step,
                    total_steps,
                    progress_percent,
                    ts_millis::to_string(&Utc::now()),
                    id
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Merge top-level keys of `patch` into workflow metadata.
    pub fn merge_workflow_metadata(
        &self,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT metadata FROM workflows WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let Some(current) = current else {
                return Ok(false);
            };

            let mut metadata: serde_json::Value = serde_json::from_str(&current)?;
            if let (Some(target), Some(source)) = (metadata.as_object_mut(), patch.as_object()) {
                for (key, value) in source {
                    target.insert(key.clone(), value.clone());
                }
            }

            tx.execute(
                "UPDATE workflows SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&metadata)?,
                    ts_millis::to_string(&Utc::now()),
                    id
                ],
            )?;
            Ok(true)
        })
    }

    pub fn delete_workflow(&self, id: &str) -> Result<bool, StoreError> {
        self.with_session(|tx| {
            let changed = tx.execute("DELETE FROM workflows WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    pub fn count_workflows_by_status(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        self.count_by_column("workflows", "state")
    }

    // ------------------------------------------------------------------
    // Audit and performance
    // ------------------------------------------------------------------

    pub fn record_audit(
        &self,
        operation: &str,
        user: Option<&str>,
        status: &str,
        details: serde_json::Value,
    ) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry {
            id: ids::new_id(),
            operation: operation.to_string(),
            user: user.map(str::to_string),
            status: status.to_string(),
            details,
            created_at: Utc::now(),
        };

        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO audit_entries (id, operation, user, status, details, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id,
                    entry.operation,
                    entry.user,
                    entry.status,
                    serde_json::to_string(&entry.details)?,
                    ts_millis::to_string(&entry.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(entry)
    }

    pub fn list_audit(&self, filter: &AuditFilter) -> Result<(Vec<AuditEntry>, usize), StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(operation) = &filter.operation {
            values.push(operation.clone());
            clauses.push(format!("operation = ?{}", values.len()));
        }
        if let Some(user) = &filter.user {
            values.push(user.clone());
            clauses.push(format!("user = ?{}", values.len()));
        }
        if let Some(status) = &filter.status {
            values.push(status.clone());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(start) = filter.start_date {
            values.push(ts_millis::to_string(&start));
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(end) = filter.end_date {
            values.push(ts_millis::to_string(&end));
            clauses.push(format!("created_at <= ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        self.with_session(|tx| {
            let total: usize = tx.query_row(
                &format!("SELECT COUNT(*) FROM audit_entries{where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get::<_, i64>(0),
            )? as usize;

            let sql = format!(
                "SELECT id, operation, user, status, details, created_at \
                 FROM audit_entries{where_sql} ORDER BY created_at DESC, id \
                 LIMIT {} OFFSET {}",
                filter.limit, filter.offset
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    operation: row.get(1)?,
                    user: row.get(2)?,
                    status: row.get(3)?,
                    details: json_col(row, 4)?,
                    created_at: ts_col(row, 5)?,
                })
            })?;
            let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((entries, total))
        })
    }

    pub fn record_performance(
        &self,
        operation: &str,
        duration_ms: f64,
        status: &str,
    ) -> Result<(), StoreError> {
        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO performance_samples (id, operation, duration_ms, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    ids::new_id(),
                    operation,
                    duration_ms,
                    status,
                    ts_millis::to_string(&Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    /// Latency statistics per operation since `since`.
    pub fn performance_stats(
        &self,
        since: DateTime<Utc>,
        operation: Option<&str>,
    ) -> Result<BTreeMap<String, OperationStats>, StoreError> {
        let samples: Vec<(String, f64)> = self.with_session(|tx| {
            let (sql, values) = match operation {
                Some(op) => (
                    "SELECT operation, duration_ms FROM performance_samples \
                     WHERE created_at >= ?1 AND operation = ?2",
                    vec![ts_millis::to_string(&since), op.to_string()],
                ),
                None => (
                    "SELECT operation, duration_ms FROM performance_samples \
                     WHERE created_at >= ?1",
                    vec![ts_millis::to_string(&since)],
                ),
            };
            let mut stmt = tx.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })?;

        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (operation, duration) in samples {
            grouped.entry(operation).or_default().push(duration);
        }

        let mut stats = BTreeMap::new();
        for (operation, mut durations) in grouped {
            durations.sort_by(|a, b| a.partial_cmp(b).expect("durations are finite"));
            let count = durations.len();
            let sum: f64 = durations.iter().sum();
            stats.insert(
                operation,
                OperationStats {
                    count,
                    avg_duration_ms: sum / count as f64,
                    min_duration_ms: durations[0],
                    max_duration_ms: durations[count - 1],
                    p50_duration_ms: percentile(&durations, 50.0),
                    p95_duration_ms: percentile(&durations, 95.0),
                    p99_duration_ms: percentile(&durations, 99.0),
                },
            );
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------

    pub fn cache_put(
        &self,
        key: &str,
        cache_type: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.with_session(|tx| {
            let now = ts_millis::to_string(&Utc::now());
            tx.execute(
                "INSERT INTO cache_entries (key, cache_type, value, created_at, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?4) \
                 ON CONFLICT(key) DO UPDATE SET value = ?3, cache_type = ?2, last_accessed = ?4",
                params![key, cache_type, serde_json::to_string(value)?, now],
            )?;
            Ok(())
        })
    }

    pub fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.with_session(|tx| {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE cache_entries SET last_accessed = ?1 WHERE key = ?2",
                params![ts_millis::to_string(&Utc::now()), key],
            )?;

            Ok(Some(serde_json::from_str(&raw)?))
        })
    }

    pub fn cache_stats(&self) -> Result<CacheEntryStats, StoreError> {
        self.with_session(|tx| {
            let mut stmt = tx.prepare(
                "SELECT cache_type, COUNT(*), COALESCE(SUM(LENGTH(value)), 0) \
                 FROM cache_entries GROUP BY cache_type",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut stats = CacheEntryStats {
                total_items: 0,
                total_size_bytes: 0,
                by_type: BTreeMap::new(),
            };
            for row in rows {
                let (cache_type, count, size) = row?;
                stats.total_items += count as usize;
                stats.total_size_bytes += size as usize;
                stats.by_type.insert(cache_type, count as usize);
            }
            Ok(stats)
        })
    }

    /// Remove cache entries, optionally limited to the given types. Returns
    /// the number of removed rows.
    pub fn clear_cache(&self, cache_types: Option<&[String]>) -> Result<usize, StoreError> {
        self.with_session(|tx| {
            let removed = match cache_types {
                Some(types) if !types.is_empty() => {
                    let placeholders = vec!["?"; types.len()].join(", ");
                    let sql =
                        format!("DELETE FROM cache_entries WHERE cache_type IN ({placeholders})");
                    tx.execute(&sql, params_from_iter(types.iter()))?
                }
                _ => tx.execute("DELETE FROM cache_entries", [])?,
            };
            Ok(removed)
        })
    }

    /// Remove entries not accessed within `max_age_hours`.
    pub fn cleanup_cache(&self, max_age_hours: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        self.with_session(|tx| {
            let removed = tx.execute(
                "DELETE FROM cache_entries WHERE last_accessed < ?1",
                params![ts_millis::to_string(&cutoff)],
            )?;
            Ok(removed)
        })
    }

    // ------------------------------------------------------------------
    // Maintenance and checkpoints
    // ------------------------------------------------------------------

    pub fn set_maintenance(
        &self,
        enabled: bool,
        reason: Option<&str>,
        enabled_by: Option<&str>,
    ) -> Result<MaintenanceFlag, StoreError> {
        let enabled_at = enabled.then(Utc::now);
        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO maintenance_flags (id, enabled, reason, enabled_by, enabled_at) \
                 VALUES (1, ?1, ?2, ?3, ?4) \
                 ON CONFLICT(id) DO UPDATE SET enabled = ?1, reason = ?2, enabled_by = ?3, \
                 enabled_at = ?4",
                params![
                    enabled as i64,
                    reason,
                    enabled_by,
                    enabled_at.map(|ts| ts_millis::to_string(&ts)),
                ],
            )?;
            Ok(())
        })?;

        Ok(MaintenanceFlag {
            enabled,
            reason: reason.map(str::to_string),
            enabled_by: enabled_by.map(str::to_string),
            enabled_at,
        })
    }

    pub fn maintenance(&self) -> Result<MaintenanceFlag, StoreError> {
        self.with_session(|tx| {
            let flag = tx
                .query_row(
                    "SELECT enabled, reason, enabled_by, enabled_at FROM maintenance_flags \
                     WHERE id = 1",
                    [],
                    |row| {
                        Ok(MaintenanceFlag {
                            enabled: row.get::<_, i64>(0)? != 0,
                            reason: row.get(1)?,
                            enabled_by: row.get(2)?,
                            enabled_at: opt_ts_col(row, 3)?,
                        })
                    },
                )
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(MaintenanceFlag {
                        enabled: false,
                        reason: None,
                        enabled_by: None,
                        enabled_at: None,
                    }),
                    other => Err(other),
                })?;
            Ok(flag)
        })
    }

    pub fn create_checkpoint(
        &self,
        name: &str,
        metadata: serde_json::Value,
    ) -> Result<Checkpoint, StoreError> {
        let checkpoint = Checkpoint {
            id: ids::new_id(),
            name: name.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        self.with_session(|tx| {
            tx.execute(
                "INSERT INTO checkpoints (id, name, metadata, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    checkpoint.id,
                    checkpoint.name,
                    serde_json::to_string(&checkpoint.metadata)?,
                    ts_millis::to_string(&checkpoint.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(checkpoint)
    }

    fn count_by_column(
        &self,
        table: &str,
        column: &str,
    ) -> Result<BTreeMap<String, i64>, StoreError> {
        self.with_session(|tx| {
            let sql = format!("SELECT {column}, COUNT(*) FROM {table} GROUP BY {column}");
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut counts = BTreeMap::new();
            for row in rows {
                let (key, count) = row?;
                counts.insert(key, count);
            }
            Ok(counts)
        })
    }
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    sorted[rank.round() as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn sample_validation(store: &Store, file_path: &str) -> ValidationRecord {
        store
            .create_validation(NewValidation {
                file_path: file_path.to_string(),
                status: Some(ValidationStatus::Pass),
                severity: Some(Severity::Info),
                validation_results: json!({"findings": []}),
                ..NewValidation::default()
            })
            .unwrap()
    }

    #[test]
    fn validation_crud_round_trip() {
        let store = store();
        let created = sample_validation(&store, "docs/a.md");

        let loaded = store.get_validation(&created.id).unwrap().unwrap();
        assert_eq!(loaded.file_path, "docs/a.md");
        assert_eq!(loaded.status, ValidationStatus::Pass);

        assert!(
            store
                .update_validation(&created.id, Some("note"), Some(ValidationStatus::Approved))
                .unwrap()
        );
        let loaded = store.get_validation(&created.id).unwrap().unwrap();
        assert_eq!(loaded.status, ValidationStatus::Approved);
        assert_eq!(loaded.notes, "note");

        assert!(store.delete_validation(&created.id).unwrap());
        assert!(!store.delete_validation(&created.id).unwrap());
        assert!(store.get_validation(&created.id).unwrap().is_none());
    }

    #[test]
    fn list_validations_filters_and_paginates() {
        let store = store();
        for i in 0..5 {
            sample_validation(&store, &format!("docs/{i}.md"));
        }
        let extra = sample_validation(&store, "docs/0.md");
        store
            .update_validation(&extra.id, None, Some(ValidationStatus::Fail))
            .unwrap();

        let (all, total) = store
            .list_validations(&ValidationFilter {
                limit: 100,
                offset: 0,
                ..ValidationFilter::default()
            })
            .unwrap();
        assert_eq!(total, 6);
        assert_eq!(all.len(), 6);

        let (page, total) = store
            .list_validations(&ValidationFilter {
                limit: 2,
                offset: 4,
                ..ValidationFilter::default()
            })
            .unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 2);

        let (failed, total) = store
            .list_validations(&ValidationFilter {
                limit: 100,
                status: Some(ValidationStatus::Fail),
                ..ValidationFilter::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(failed[0].id, extra.id);

        let (by_path, _) = store
            .list_validations(&ValidationFilter {
                limit: 100,
                file_path: Some("docs/0.md".to_string()),
                ..ValidationFilter::default()
            })
            .unwrap();
        assert_eq!(by_path.len(), 2);
    }

    #[test]
    fn batch_status_update_reports_missing_ids() {
        let store = store();
        let a = sample_validation(&store, "a.md");
        let b = sample_validation(&store, "b.md");

        let ids = vec![a.id.clone(), "missing".to_string(), b.id.clone()];
        let (updated, errors) = store
            .update_validation_status_batch(&ids, ValidationStatus::Approved, None)
            .unwrap();

        assert_eq!(updated, 2);
        assert_eq!(errors, vec!["Validation missing not found"]);
        assert_eq!(
            store.get_validation(&a.id).unwrap().unwrap().status,
            ValidationStatus::Approved
        );
    }

    #[test]
    fn batch_reject_appends_reason_to_notes() {
        let store = store();
        let a = sample_validation(&store, "a.md");
        store
            .update_validation(&a.id, Some("existing"), None)
            .unwrap();

        store
            .update_validation_status_batch(
                std::slice::from_ref(&a.id),
                ValidationStatus::Rejected,
                Some("Rejected: bad header"),
            )
            .unwrap();

        let loaded = store.get_validation(&a.id).unwrap().unwrap();
        assert_eq!(loaded.notes, "existing\nRejected: bad header");
    }

    #[test]
    fn recommendation_lifecycle_and_cascade() {
        let store = store();
        let validation = sample_validation(&store, "a.md");

        let rec = store
            .create_recommendation(NewRecommendation {
                validation_id: validation.id.clone(),
                kind: "content_fix".to_string(),
                original_content: Some("foo".to_string()),
                proposed_content: Some("bar".to_string()),
                confidence: 0.9,
                metadata: json!({}),
                ..NewRecommendation::default()
            })
            .unwrap();
        assert_eq!(rec.status, RecommendationStatus::Pending);

        store
            .update_recommendation_status(&rec.id, RecommendationStatus::Approved, Some("lgtm"))
            .unwrap();
        let loaded = store.get_recommendation(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.status, RecommendationStatus::Approved);
        assert!(loaded.reviewed_at.is_some());
        assert_eq!(loaded.review_notes.as_deref(), Some("lgtm"));

        store
            .update_recommendation_status(&rec.id, RecommendationStatus::Applied, None)
            .unwrap();
        let loaded = store.get_recommendation(&rec.id).unwrap().unwrap();
        assert!(loaded.applied_at.is_some());

        // Deleting the validation cascades.
        store.delete_validation(&validation.id).unwrap();
        assert!(store.get_recommendation(&rec.id).unwrap().is_none());
    }

    #[test]
    fn workflow_state_and_progress() {
        let store = store();
        let workflow = store
            .create_workflow(
                WorkflowType::ValidateDirectory,
                json!({"directory_path": "./docs"}),
                json!({"name": null}),
            )
            .unwrap();
        assert_eq!(workflow.state, WorkflowState::Pending);

        store
            .set_workflow_state(&workflow.id, WorkflowState::Running, None)
            .unwrap();
        store
            .update_workflow_progress(&workflow.id, 5, 10, 50.0)
            .unwrap();

        let loaded = store.get_workflow(&workflow.id).unwrap().unwrap();
        assert_eq!(loaded.state, WorkflowState::Running);
        assert_eq!(loaded.current_step, 5);
        assert!(loaded.completed_at.is_none());

        store
            .set_workflow_state(&workflow.id, WorkflowState::Completed, None)
            .unwrap();
        let loaded = store.get_workflow(&workflow.id).unwrap().unwrap();
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn workflow_metadata_merge() {
        let store = store();
        let workflow = store
            .create_workflow(WorkflowType::FullAudit, json!({}), json!({"name": "audit"}))
            .unwrap();

        store
            .merge_workflow_metadata(&workflow.id, &json!({"files_total": 10}))
            .unwrap();
        store
            .merge_workflow_metadata(&workflow.id, &json!({"files_processed": 3}))
            .unwrap();

        let loaded = store.get_workflow(&workflow.id).unwrap().unwrap();
        assert_eq!(loaded.metadata["name"], "audit");
        assert_eq!(loaded.metadata["files_total"], 10);
        assert_eq!(loaded.metadata["files_processed"], 3);
    }

    #[test]
    fn audit_log_filters() {
        let store = store();
        store
            .record_audit("approve", Some("alice"), "ok", json!({}))
            .unwrap();
        store
            .record_audit("enhance", Some("bob"), "error", json!({}))
            .unwrap();

        let (all, total) = store
            .list_audit(&AuditFilter {
                limit: 100,
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);

        let (filtered, total) = store
            .list_audit(&AuditFilter {
                limit: 100,
                operation: Some("approve".to_string()),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(filtered[0].user.as_deref(), Some("alice"));
    }

    #[test]
    fn performance_stats_aggregate() {
        let store = store();
        for duration in [10.0, 20.0, 30.0] {
            store.record_performance("validate_file", duration, "ok").unwrap();
        }
        store.record_performance("approve", 5.0, "ok").unwrap();

        let stats = store
            .performance_stats(Utc::now() - Duration::hours(1), None)
            .unwrap();
        assert_eq!(stats.len(), 2);

        let validate = &stats["validate_file"];
        assert_eq!(validate.count, 3);
        assert_eq!(validate.min_duration_ms, 10.0);
        assert_eq!(validate.max_duration_ms, 30.0);
        assert_eq!(validate.avg_duration_ms, 20.0);
        assert_eq!(validate.p50_duration_ms, 20.0);

        let only = store
            .performance_stats(Utc::now() - Duration::hours(1), Some("approve"))
            .unwrap();
        assert_eq!(only.len(), 1);
    }

    #[test]
    fn cache_operations() {
        let store = store();
        store
            .cache_put("rules:words", "rules", &json!({"x": 1}))
            .unwrap();
        store
            .cache_put("validation:abc", "validation", &json!([1, 2]))
            .unwrap();

        assert_eq!(
            store.cache_get("rules:words").unwrap(),
            Some(json!({"x": 1}))
        );
        assert_eq!(store.cache_get("missing").unwrap(), None);

        let stats = store.cache_stats().unwrap();
        assert_eq!(stats.total_items, 2);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.by_type["rules"], 1);

        let cleared = store
            .clear_cache(Some(&["rules".to_string()]))
            .unwrap();
        assert_eq!(cleared, 1);

        let cleared = store.clear_cache(None).unwrap();
        assert_eq!(cleared, 1);

        store.cache_put("k", "t", &json!(1)).unwrap();
        // Nothing is older than 24h in this test.
        assert_eq!(store.cleanup_cache(24).unwrap(), 0);
        assert_eq!(store.cleanup_cache(0).unwrap(), 1);
    }

    #[test]
    fn maintenance_flag_round_trip() {
        let store = store();
        assert!(!store.maintenance().unwrap().enabled);

        store
            .set_maintenance(true, Some("upgrade"), Some("ops"))
            .unwrap();
        let flag = store.maintenance().unwrap();
        assert!(flag.enabled);
        assert_eq!(flag.reason.as_deref(), Some("upgrade"));
        assert!(flag.enabled_at.is_some());

        store.set_maintenance(false, None, None).unwrap();
        assert!(!store.maintenance().unwrap().enabled);
    }

    #[test]
    fn session_rolls_back_on_error() {
        let store = store();
        let record = sample_validation(&store, "a.md");

        let result: Result<(), StoreError> = store.with_session(|tx| {
            tx.execute("DELETE FROM validations WHERE id = ?1", params![record.id])?;
            Err(StoreError::NotFound {
                entity: "Validation",
                id: "forced".to_string(),
            })
        });
        assert!(result.is_err());

        // The delete above must have been rolled back.
        assert!(store.get_validation(&record.id).unwrap().is_some());
    }

    #[test]
    fn percentile_boundaries() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
