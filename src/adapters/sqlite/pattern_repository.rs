//! SQLite implementation of the PatternRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GeneratedFile, PatternKind, PatternRecord};
use crate::domain::ports::PatternRepository;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqlitePatternRepository {
    pool: SqlitePool,
}

impl SqlitePatternRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatternRepository for SqlitePatternRepository {
    async fn insert(&self, pattern: &PatternRecord) -> DomainResult<()> {
        let key_terms = serde_json::to_string(&pattern.key_terms)?;
        let files = serde_json::to_string(&pattern.files)?;
        let output = serde_json::to_string(&pattern.output)?;

        sqlx::query(
            r#"INSERT INTO patterns (id, kind, fingerprint, key_terms, files, output, explanation,
               category, use_count, success_rate, created_at, last_used_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(pattern.id.to_string())
        .bind(pattern.kind.as_str())
        .bind(&pattern.fingerprint)
        .bind(&key_terms)
        .bind(&files)
        .bind(&output)
        .bind(&pattern.explanation)
        .bind(&pattern.category)
        .bind(i64::from(pattern.use_count))
        .bind(i64::from(pattern.success_rate))
        .bind(pattern.created_at.to_rfc3339())
        .bind(pattern.last_used_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, pattern: &PatternRecord) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE patterns SET use_count = ?, success_rate = ?, last_used_at = ?, category = ? WHERE id = ?",
        )
        .bind(i64::from(pattern.use_count))
        .bind(i64::from(pattern.success_rate))
        .bind(pattern.last_used_at.map(|t| t.to_rfc3339()))
        .bind(&pattern.category)
        .bind(pattern.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::PatternNotFound(pattern.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<PatternRecord>> {
        let row: Option<PatternRow> = sqlx::query_as("SELECT * FROM patterns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_kind(&self, kind: PatternKind) -> DomainResult<Vec<PatternRecord>> {
        let rows: Vec<PatternRow> =
            sqlx::query_as("SELECT * FROM patterns WHERE kind = ? ORDER BY created_at")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct PatternRow {
    id: String,
    kind: String,
    fingerprint: String,
    key_terms: Option<String>,
    files: Option<String>,
    output: Option<String>,
    explanation: String,
    category: Option<String>,
    use_count: i64,
    success_rate: i64,
    created_at: String,
    last_used_at: Option<String>,
}

impl TryFrom<PatternRow> for PatternRecord {
    type Error = DomainError;

    fn try_from(row: PatternRow) -> Result<Self, Self::Error> {
        let kind = PatternKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid pattern kind: {}", row.kind)))?;
        let output: Vec<GeneratedFile> = parse_json_or_default(row.output)?;

        Ok(PatternRecord {
            id: parse_uuid(&row.id)?,
            kind,
            fingerprint: row.fingerprint,
            key_terms: parse_json_or_default(row.key_terms)?,
            files: parse_json_or_default(row.files)?,
            output,
            explanation: row.explanation,
            category: row.category,
            use_count: u32::try_from(row.use_count)
                .map_err(|_| DomainError::SerializationError(format!("Invalid use count: {}", row.use_count)))?,
            success_rate: u32::try_from(row.success_rate).map_err(|_| {
                DomainError::SerializationError(format!("Invalid success rate: {}", row.success_rate))
            })?,
            created_at: parse_datetime(&row.created_at)?,
            last_used_at: parse_optional_datetime(row.last_used_at)?,
        })
    }
}
