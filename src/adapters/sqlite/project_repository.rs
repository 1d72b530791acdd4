use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Project, ProjectPhase, ProjectStatus};
use crate::domain::ports::ProjectRepository;

pub struct SqliteProjectRepository {
    pool: SqlitePool,
}

impl SqliteProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Project> {
        let id: String = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let phase: String = row.try_get("phase")?;
        Ok(Project {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status: ProjectStatus::parse_str(&status)
                .ok_or_else(|| CoreError::validation(format!("unknown project status {status}")))?,
            phase: ProjectPhase::parse_str(&phase)
                .ok_or_else(|| CoreError::validation(format!("unknown project phase {phase}")))?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn create(&self, project: &Project) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO projects (id, name, description, status, phase, user_id, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.phase.as_str())
        .bind(&project.user_id)
        .bind(project.created_at)
        .bind(project.updated_at)
        .bind(project.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Project> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("project", id))?;
        Self::from_row(&row)
    }

    async fn update(&self, project: &Project) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE projects SET name = ?1, description = ?2, status = ?3, phase = ?4,
             updated_at = ?5, version = ?6
             WHERE id = ?7 AND version = ?8",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.phase.as_str())
        .bind(project.updated_at)
        .bind(project.version as i64)
        .bind(project.id.to_string())
        .bind((project.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("project", project.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM projects WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_user(&self, user_id: &str) -> CoreResult<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects WHERE user_id = ?1 ORDER BY created_at ASC")
            .bind(user_id)
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

    async fn repo() -> SqliteProjectRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        SqliteProjectRepository::new(pool)
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let repo = repo().await;
        let project = Project::new("demo", "user-1");
        repo.create(&project).await.unwrap();
        let fetched = repo.get(project.id).await.unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let repo = repo().await;
        let mut project = Project::new("demo", "user-1");
        repo.create(&project).await.unwrap();

        let mut stale = project.clone();
        project.start().unwrap();
        repo.update(&project).await.unwrap();

        stale.pause().ok();
        stale.start().unwrap();
        let err = repo.update(&stale).await.unwrap_err();
        assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));
    }
}
