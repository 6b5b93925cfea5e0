//! Durable, append-only record of analyzed failures.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert`](CaseStore::insert) | Write one record atomically |
//! | [`get`](CaseStore::get) | Point lookup by id |
//! | [`list`](CaseStore::list) | Page of summaries, newest first, optional exact tag filter |
//!
//! Records are never updated. Two backends: [`SqliteCaseStore`] (the
//! `cases` table) and [`InMemoryCaseStore`] for tests.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::RwLock;

use crate::error::CaseStoreError;
use crate::models::{CasePage, CaseRecord, CaseSummary, CodeContext};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn insert(&self, record: &CaseRecord) -> Result<(), CaseStoreError>;

    async fn get(&self, id: &str) -> Result<Option<CaseRecord>, CaseStoreError>;

    /// `page` is 1-based and clamped to at least 1; `limit` is clamped to
    /// `[1, MAX_PAGE_LIMIT]`.
    async fn list(
        &self,
        tag: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<CasePage, CaseStoreError>;
}

fn normalize_page(page: i64, limit: i64) -> (i64, i64) {
    (page.max(1), limit.clamp(1, MAX_PAGE_LIMIT))
}

/// Rows to skip for a normalized page. Saturates, so a huge page number is
/// simply past the end.
fn page_offset(page: i64, limit: i64) -> i64 {
    (page - 1).saturating_mul(limit)
}

/// Fixed-width UTC timestamp so lexical order matches time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn summarize(record: &CaseRecord) -> CaseSummary {
    CaseSummary {
        id: record.id.clone(),
        case_name: record.case_name.clone(),
        command: record.command.clone(),
        tags: record.tags.clone(),
        created_at: format_ts(&record.created_at),
    }
}

// ============ SQLite ============

pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> CaseStoreError {
    CaseStoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_tags(id: &str, tags_json: &str) -> Result<Vec<String>, CaseStoreError> {
    serde_json::from_str(tags_json).map_err(|e| corrupt(id, e))
}

fn parse_ts(id: &str, ts: &str) -> Result<DateTime<Utc>, CaseStoreError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(id, e))
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    async fn insert(&self, record: &CaseRecord) -> Result<(), CaseStoreError> {
        let tags_json = serde_json::to_string(&record.tags)?;
        let code_context_json = record
            .code_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO cases (id, case_name, command, error_log, code_context_json,
                               root_cause, solution, tags_json, created_at, vector_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.case_name)
        .bind(&record.command)
        .bind(&record.error_log)
        .bind(code_context_json)
        .bind(&record.root_cause)
        .bind(&record.solution)
        .bind(tags_json)
        .bind(format_ts(&record.created_at))
        .bind(&record.vector_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, case_name, command, error_log, code_context_json,
                   root_cause, solution, tags_json, created_at, vector_id
            FROM cases WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let code_context: Option<String> = row.get("code_context_json");
        let code_context = code_context
            .map(|json| serde_json::from_str::<CodeContext>(&json))
            .transpose()
            .map_err(|e| corrupt(id, e))?;
        let tags_json: String = row.get("tags_json");
        let created_at: String = row.get("created_at");

        Ok(Some(CaseRecord {
            id: row.get("id"),
            case_name: row.get("case_name"),
            command: row.get("command"),
            error_log: row.get("error_log"),
            code_context,
            root_cause: row.get("root_cause"),
            solution: row.get("solution"),
            tags: parse_tags(id, &tags_json)?,
            created_at: parse_ts(id, &created_at)?,
            vector_id: row.get("vector_id"),
        }))
    }

    async fn list(
        &self,
        tag: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<CasePage, CaseStoreError> {
        let (page, limit) = normalize_page(page, limit);
        let tag_filter =
            "(? IS NULL OR EXISTS (SELECT 1 FROM json_each(cases.tags_json) WHERE json_each.value = ?))";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM cases WHERE {}",
            tag_filter
        ))
        .bind(tag)
        .bind(tag)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, case_name, command, tags_json, created_at
            FROM cases WHERE {}
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
            tag_filter
        ))
        .bind(tag)
        .bind(tag)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let mut errors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let tags_json: String = row.get("tags_json");
            errors.push(CaseSummary {
                tags: parse_tags(&id, &tags_json)?,
                case_name: row.get("case_name"),
                command: row.get("command"),
                created_at: row.get("created_at"),
                id,
            });
        }

        Ok(CasePage {
            total,
            page,
            limit,
            errors,
        })
    }
}

// ============ In-Memory ============

#[derive(Default)]
pub struct InMemoryCaseStore {
    records: RwLock<Vec<CaseRecord>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn insert(&self, record: &CaseRecord) -> Result<(), CaseStoreError> {
        let mut records = self.records.write().map_err(|_| CaseStoreError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        let records = self.records.read().map_err(|_| CaseStoreError::Poisoned)?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list(
        &self,
        tag: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<CasePage, CaseStoreError> {
        let (page, limit) = normalize_page(page, limit);
        let records = self.records.read().map_err(|_| CaseStoreError::Poisoned)?;

        // Newest insert first among equal timestamps.
        let mut matching: Vec<&CaseRecord> = records
            .iter()
            .rev()
            .filter(|r| tag.map_or(true, |t| r.tags.iter().any(|rt| rt == t)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let errors = matching
            .iter()
            .skip(usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX))
            .take(limit as usize)
            .map(|r| summarize(r))
            .collect();

        Ok(CasePage {
            total: matching.len() as i64,
            page,
            limit,
            errors,
        })
    }
}
