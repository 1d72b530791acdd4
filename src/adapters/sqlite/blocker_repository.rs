use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Blocker, BlockerKind, BlockerSeverity, BlockerStatus};
use crate::domain::ports::BlockerRepository;

pub struct SqliteBlockerRepository {
    pool: SqlitePool,
}

impl SqliteBlockerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Blocker> {
        let id: String = row.try_get("id")?;
        let task_id: String = row.try_get("task_id")?;
        let agent_id: String = row.try_get("agent_id")?;
        let kind: String = row.try_get("kind")?;
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;
        Ok(Blocker {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            task_id: Uuid::parse_str(&task_id).map_err(|e| CoreError::validation(e.to_string()))?,
            agent_id: Uuid::parse_str(&agent_id).map_err(|e| CoreError::validation(e.to_string()))?,
            kind: BlockerKind::parse_str(&kind)
                .ok_or_else(|| CoreError::validation(format!("unknown blocker kind {kind}")))?,
            severity: BlockerSeverity::parse_str(&severity)
                .ok_or_else(|| CoreError::validation(format!("unknown blocker severity {severity}")))?,
            status: BlockerStatus::parse_str(&status)
                .ok_or_else(|| CoreError::validation(format!("unknown blocker status {status}")))?,
            prompt: row.try_get("prompt")?,
            answer: row.try_get("answer")?,
            deadline: row.try_get::<Option<DateTime<Utc>>, _>("deadline")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            resolved_at: row.try_get::<Option<DateTime<Utc>>, _>("resolved_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl BlockerRepository for SqliteBlockerRepository {
    async fn create(&self, blocker: &Blocker) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO blockers (id, task_id, agent_id, kind, severity, status, prompt, answer,
             deadline, created_at, resolved_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(blocker.id.to_string())
        .bind(blocker.task_id.to_string())
        .bind(blocker.agent_id.to_string())
        .bind(blocker.kind.as_str())
        .bind(blocker.severity.as_str())
        .bind(blocker.status.as_str())
        .bind(&blocker.prompt)
        .bind(&blocker.answer)
        .bind(blocker.deadline)
        .bind(blocker.created_at)
        .bind(blocker.resolved_at)
        .bind(blocker.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Blocker> {
        let row = sqlx::query("SELECT * FROM blockers WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("blocker", id))?;
        Self::from_row(&row)
    }

    async fn update(&self, blocker: &Blocker) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE blockers SET status = ?1, answer = ?2, resolved_at = ?3, version = ?4
             WHERE id = ?5 AND version = ?6",
        )
        .bind(blocker.status.as_str())
        .bind(&blocker.answer)
        .bind(blocker.resolved_at)
        .bind(blocker.version as i64)
        .bind(blocker.id.to_string())
        .bind((blocker.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("blocker", blocker.id));
        }
        Ok(())
    }

    async fn list_by_project(&self, project_id: Uuid, open_only: bool) -> CoreResult<Vec<Blocker>> {
        let sql = if open_only {
            "SELECT b.* FROM blockers b JOIN tasks t ON t.id = b.task_id
             WHERE t.project_id = ?1 AND b.status = 'open'"
        } else {
            "SELECT b.* FROM blockers b JOIN tasks t ON t.id = b.task_id WHERE t.project_id = ?1"
        };
        let rows = sqlx::query(sql).bind(project_id.to_string()).fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_task(&self, task_id: Uuid) -> CoreResult<Vec<Blocker>> {
        let rows = sqlx::query("SELECT * FROM blockers WHERE task_id = ?1")
            .bind(task_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_past_deadline(&self) -> CoreResult<Vec<Blocker>> {
        let now = Utc::now();
        let rows = sqlx::query("SELECT * FROM blockers WHERE status = 'open' AND deadline IS NOT NULL AND deadline <= ?1")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }
}
