//! SQLite persistence for documents, clauses, and feedback.
//!
//! Every mutating repository method is one transition boundary and runs in
//! a single transaction, so a failure mid-transition can never leave rows
//! from a half-applied status change behind.
//!
//! Identifiers and timestamps are stored as text (hyphenated UUIDs,
//! RFC 3339) to keep the schema portable and diffable.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::info;
use uuid::Uuid;

use covenant_core::{
    Clause, ClauseId, Document, DocumentId, DocumentStatus, Feedback, PortError, Repository,
};

use crate::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    original_path TEXT NOT NULL,
    redline_path  TEXT,
    clean_path    TEXT,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clauses (
    id               TEXT PRIMARY KEY,
    document_id      TEXT NOT NULL REFERENCES documents(id),
    clause_text      TEXT NOT NULL,
    original_text    TEXT NOT NULL,
    suggested_text   TEXT,
    confidence_score INTEGER NOT NULL,
    validation_score INTEGER,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_clauses_document ON clauses(document_id);

CREATE TABLE IF NOT EXISTS feedback (
    id            TEXT PRIMARY KEY,
    document_id   TEXT NOT NULL REFERENCES documents(id),
    feedback_text TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feedback_document ON feedback(document_id);
";

/// SQLite-backed [`Repository`].
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open or create a database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.migrate().await?;
        info!(path = %path.display(), "opened document database");
        Ok(repo)
    }

    /// Open an ephemeral in-memory database.
    ///
    /// Capped at one connection: each SQLite memory database is private to
    /// its connection, so a larger pool would see different databases.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

// ── Row mapping ──

fn parse_uuid(value: &str) -> Result<Uuid, PortError> {
    Uuid::parse_str(value).map_err(|e| PortError::fatal(format!("malformed uuid column: {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PortError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PortError::fatal(format!("malformed timestamp column: {e}")))
}

fn parse_score(value: i64) -> Result<u8, PortError> {
    u8::try_from(value).map_err(|_| PortError::fatal(format!("score {value} out of range")))
}

fn db_err(e: sqlx::Error) -> PortError {
    PortError::fatal(format!("sqlite: {e}"))
}

fn document_from_row(row: &SqliteRow) -> Result<Document, PortError> {
    let status: String = row.get("status");
    Ok(Document {
        id: parse_uuid(row.get("id"))?,
        user_id: row.get("user_id"),
        original_path: row.get("original_path"),
        redline_path: row.get("redline_path"),
        clean_path: row.get("clean_path"),
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| PortError::fatal(format!("unknown status {status:?}")))?,
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn clause_from_row(row: &SqliteRow) -> Result<Clause, PortError> {
    let validation: Option<i64> = row.get("validation_score");
    Ok(Clause {
        id: parse_uuid(row.get("id"))?,
        document_id: parse_uuid(row.get("document_id"))?,
        clause_text: row.get("clause_text"),
        original_text: row.get("original_text"),
        suggested_text: row.get("suggested_text"),
        confidence_score: parse_score(row.get("confidence_score"))?,
        validation_score: validation.map(parse_score).transpose()?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback, PortError> {
    Ok(Feedback {
        id: parse_uuid(row.get("id"))?,
        document_id: parse_uuid(row.get("document_id"))?,
        feedback_text: row.get("feedback_text"),
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_document(&self, document: &Document) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO documents
                 (id, user_id, original_path, redline_path, clean_path,
                  status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(&document.user_id)
        .bind(&document.original_path)
        .bind(&document.redline_path)
        .bind(&document.clean_path)
        .bind(document.status.as_str())
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), PortError> {
        let result = sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::fatal(format!("document {id} missing")));
        }
        Ok(())
    }

    async fn replace_analysis(
        &self,
        id: DocumentId,
        clauses: &[Clause],
        redline_path: &str,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM clauses WHERE document_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for clause in clauses {
            sqlx::query(
                "INSERT INTO clauses
                     (id, document_id, clause_text, original_text,
                      suggested_text, confidence_score, validation_score, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(clause.id.to_string())
            .bind(clause.document_id.to_string())
            .bind(&clause.clause_text)
            .bind(&clause.original_text)
            .bind(&clause.suggested_text)
            .bind(i64::from(clause.confidence_score))
            .bind(clause.validation_score.map(i64::from))
            .bind(clause.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let result = sqlx::query(
            "UPDATE documents SET redline_path = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(redline_path)
        .bind(DocumentStatus::RedlineReady.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::fatal(format!("document {id} missing")));
        }

        tx.commit().await.map_err(db_err)
    }

    async fn clauses(&self, id: DocumentId) -> Result<Vec<Clause>, PortError> {
        let rows = sqlx::query("SELECT * FROM clauses WHERE document_id = ? ORDER BY rowid")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(clause_from_row).collect()
    }

    async fn apply_validation_scores(
        &self,
        id: DocumentId,
        scores: &[(ClauseId, u8)],
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (clause_id, score) in scores {
            sqlx::query("UPDATE clauses SET validation_score = ? WHERE id = ? AND document_id = ?")
                .bind(i64::from(*score))
                .bind(clause_id.to_string())
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO feedback (id, document_id, feedback_text, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(feedback.id.to_string())
        .bind(feedback.document_id.to_string())
        .bind(&feedback.feedback_text)
        .bind(feedback.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let result = sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(DocumentStatus::FeedbackReceived.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(feedback.document_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::fatal(format!(
                "document {} missing",
                feedback.document_id
            )));
        }

        tx.commit().await.map_err(db_err)
    }

    async fn feedback(&self, id: DocumentId) -> Result<Vec<Feedback>, PortError> {
        let rows = sqlx::query("SELECT * FROM feedback WHERE document_id = ? ORDER BY rowid")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(feedback_from_row).collect()
    }

    async fn set_clean(&self, id: DocumentId, clean_path: &str) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE documents SET clean_path = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(clean_path)
        .bind(DocumentStatus::Completed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::fatal(format!("document {id} missing")));
        }
        Ok(())
    }
}
