use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::Checkpoint;
use crate::domain::ports::CheckpointRepository;

pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Checkpoint> {
        let id: String = row.try_get("id")?;
        let project_id: String = row.try_get("project_id")?;
        Ok(Checkpoint {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            project_id: Uuid::parse_str(&project_id).map_err(|e| CoreError::validation(e.to_string()))?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            git_ref: row.try_get("git_ref")?,
            state_snapshot: row.try_get("state_snapshot")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn create(&self, checkpoint: &Checkpoint) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO checkpoints (id, project_id, name, description, git_ref, state_snapshot, created_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(checkpoint.id.to_string())
        .bind(checkpoint.project_id.to_string())
        .bind(&checkpoint.name)
        .bind(&checkpoint.description)
        .bind(&checkpoint.git_ref)
        .bind(&checkpoint.state_snapshot)
        .bind(checkpoint.created_at)
        .bind(checkpoint.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Checkpoint> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("checkpoint", id))?;
        Self::from_row(&row)
    }

    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Checkpoint>> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE project_id = ?1 ORDER BY created_at ASC")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_for_project(&self, project_id: Uuid) -> CoreResult<Option<Checkpoint>> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE project_id = ?1 ORDER BY created_at DESC LIMIT 1")
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;

    #[tokio::test]
    async fn latest_for_project_picks_most_recent() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let repo = SqliteCheckpointRepository::new(pool);
        let project_id = Uuid::new_v4();

        let first = Checkpoint::new(project_id, "first", vec![1], None);
        repo.create(&first).await.unwrap();
        let second = Checkpoint::new(project_id, "second", vec![2], None);
        repo.create(&second).await.unwrap();

        let latest = repo.latest_for_project(project_id).await.unwrap().unwrap();
        assert_eq!(latest.name, "second");
    }
}
