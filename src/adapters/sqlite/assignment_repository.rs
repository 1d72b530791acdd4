use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::Assignment;
use crate::domain::ports::AssignmentRepository;

pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Assignment> {
        let id: String = row.try_get("id")?;
        let project_id: String = row.try_get("project_id")?;
        let agent_id: String = row.try_get("agent_id")?;
        Ok(Assignment {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            project_id: Uuid::parse_str(&project_id).map_err(|e| CoreError::validation(e.to_string()))?,
            agent_id: Uuid::parse_str(&agent_id).map_err(|e| CoreError::validation(e.to_string()))?,
            role: row.try_get("role")?,
            assigned_at: row.try_get::<DateTime<Utc>, _>("assigned_at")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn create(&self, assignment: &Assignment) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO project_agents (id, project_id, agent_id, role, assigned_at, is_active, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(assignment.id.to_string())
        .bind(assignment.project_id.to_string())
        .bind(assignment.agent_id.to_string())
        .bind(&assignment.role)
        .bind(assignment.assigned_at)
        .bind(assignment.is_active as i64)
        .bind(assignment.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Assignment> {
        let row = sqlx::query("SELECT * FROM project_agents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("assignment", id))?;
        Self::from_row(&row)
    }

    async fn update(&self, assignment: &Assignment) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE project_agents SET role = ?1, is_active = ?2, version = ?3
             WHERE id = ?4 AND version = ?5",
        )
        .bind(&assignment.role)
        .bind(assignment.is_active as i64)
        .bind(assignment.version as i64)
        .bind(assignment.id.to_string())
        .bind((assignment.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("assignment", assignment.id));
        }
        Ok(())
    }

    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Assignment>> {
        let rows = sqlx::query("SELECT * FROM project_agents WHERE project_id = ?1")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_agent(&self, agent_id: Uuid) -> CoreResult<Vec<Assignment>> {
        let rows = sqlx::query("SELECT * FROM project_agents WHERE agent_id = ?1")
            .bind(agent_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn find_active(&self, project_id: Uuid, agent_id: Uuid) -> CoreResult<Option<Assignment>> {
        let row = sqlx::query(
            "SELECT * FROM project_agents WHERE project_id = ?1 AND agent_id = ?2 AND is_active = 1",
        )
        .bind(project_id.to_string())
        .bind(agent_id.to_string())
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
    use crate::domain::models::{Agent, AgentType, Project};

    async fn repo() -> (SqliteAssignmentRepository, SqlitePool) {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        (SqliteAssignmentRepository::new(pool.clone()), pool)
    }

    async fn seed(pool: &SqlitePool) -> (Uuid, Uuid) {
        let project = Project::new("demo", "user-1");
        sqlx::query(
            "INSERT INTO projects (id, name, description, status, phase, user_id, created_at, updated_at, version)
             VALUES (?1, ?2, '', ?3, ?4, ?5, ?6, ?7, 0)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(project.status.as_str())
        .bind(project.phase.as_str())
        .bind(&project.user_id)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(pool)
        .await
        .unwrap();

        let agent = Agent::new(AgentType::Backend, "anthropic");
        sqlx::query(
            "INSERT INTO agents (id, agent_type, provider, maturity, status, context_tokens, version)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
        )
        .bind(agent.id.to_string())
        .bind(agent.agent_type.as_str())
        .bind(&agent.provider)
        .bind(agent.maturity.as_str())
        .bind(agent.status.as_str())
        .execute(pool)
        .await
        .unwrap();

        (project.id, agent.id)
    }

    #[tokio::test]
    async fn find_active_matches_is_active_true() {
        let (repo, pool) = repo().await;
        let (project_id, agent_id) = seed(&pool).await;
        let assignment = Assignment::new(project_id, agent_id, "primary_backend");
        repo.create(&assignment).await.unwrap();

        let found = repo.find_active(project_id, agent_id).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn deactivated_assignment_is_not_active() {
        let (repo, pool) = repo().await;
        let (project_id, agent_id) = seed(&pool).await;
        let mut assignment = Assignment::new(project_id, agent_id, "primary_backend");
        repo.create(&assignment).await.unwrap();
        assignment.deactivate();
        repo.update(&assignment).await.unwrap();

        assert!(repo.find_active(project_id, agent_id).await.unwrap().is_none());
    }
}
