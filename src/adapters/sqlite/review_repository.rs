use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::ReviewReport;
use crate::domain::ports::ReviewRepository;

pub struct SqliteReviewRepository {
    pool: SqlitePool,
}

impl SqliteReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<ReviewReport> {
        let id: String = row.try_get("id")?;
        let task_id: String = row.try_get("task_id")?;
        let issues: String = row.try_get("issues")?;
        Ok(ReviewReport {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            task_id: Uuid::parse_str(&task_id).map_err(|e| CoreError::validation(e.to_string()))?,
            fingerprint: row.try_get("fingerprint")?,
            issues: serde_json::from_str(&issues).map_err(|e| CoreError::validation(e.to_string()))?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl ReviewRepository for SqliteReviewRepository {
    async fn create(&self, report: &ReviewReport) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO review_reports (id, task_id, fingerprint, issues, created_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(report.id.to_string())
        .bind(report.task_id.to_string())
        .bind(&report.fingerprint)
        .bind(serde_json::to_string(&report.issues).unwrap())
        .bind(report.created_at)
        .bind(report.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_fingerprint(&self, task_id: Uuid, fingerprint: &str) -> CoreResult<Option<ReviewReport>> {
        let row = sqlx::query("SELECT * FROM review_reports WHERE task_id = ?1 AND fingerprint = ?2")
            .bind(task_id.to_string())
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_by_task(&self, task_id: Uuid) -> CoreResult<Vec<ReviewReport>> {
        let rows = sqlx::query("SELECT * FROM review_reports WHERE task_id = ?1 ORDER BY created_at ASC")
            .bind(task_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;

    #[tokio::test]
    async fn find_by_fingerprint_is_the_cache_lookup() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let repo = SqliteReviewRepository::new(pool);
        let task_id = Uuid::new_v4();

        let report = ReviewReport::new(task_id, "fp-abc", vec![]);
        repo.create(&report).await.unwrap();

        assert!(repo.find_by_fingerprint(task_id, "fp-abc").await.unwrap().is_some());
        assert!(repo.find_by_fingerprint(task_id, "fp-xyz").await.unwrap().is_none());
    }
}
