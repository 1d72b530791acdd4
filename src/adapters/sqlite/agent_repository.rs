use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Agent, AgentStatus, AgentType, Maturity};
use crate::domain::ports::AgentRepository;

pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Agent> {
        let id: String = row.try_get("id")?;
        let agent_type: String = row.try_get("agent_type")?;
        let maturity: String = row.try_get("maturity")?;
        let status: String = row.try_get("status")?;
        Ok(Agent {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            agent_type: AgentType::parse_str(&agent_type)
                .ok_or_else(|| CoreError::validation(format!("unknown agent type {agent_type}")))?,
            provider: row.try_get("provider")?,
            maturity: Maturity::parse_str(&maturity)
                .ok_or_else(|| CoreError::validation(format!("unknown maturity {maturity}")))?,
            status: AgentStatus::parse_str(&status)
                .ok_or_else(|| CoreError::validation(format!("unknown agent status {status}")))?,
            context_tokens: row.try_get::<i64, _>("context_tokens")? as u64,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, agent_type, provider, maturity, status, context_tokens, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(agent.id.to_string())
        .bind(agent.agent_type.as_str())
        .bind(&agent.provider)
        .bind(agent.maturity.as_str())
        .bind(agent.status.as_str())
        .bind(agent.context_tokens as i64)
        .bind(agent.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Agent> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("agent", id))?;
        Self::from_row(&row)
    }

    async fn update(&self, agent: &Agent) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE agents SET maturity = ?1, status = ?2, context_tokens = ?3, version = ?4
             WHERE id = ?5 AND version = ?6",
        )
        .bind(agent.maturity.as_str())
        .bind(agent.status.as_str())
        .bind(agent.context_tokens as i64)
        .bind(agent.version as i64)
        .bind(agent.id.to_string())
        .bind((agent.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("agent", agent.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents").fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_available(&self) -> CoreResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents WHERE status = 'idle'")
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

    async fn repo() -> SqliteAgentRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn create_and_list_available() {
        let repo = repo().await;
        let agent = Agent::new(AgentType::Backend, "anthropic");
        repo.create(&agent).await.unwrap();
        let available = repo.list_available().await.unwrap();
        assert_eq!(available.len(), 1);
    }

    #[tokio::test]
    async fn update_removes_from_available_when_working() {
        let repo = repo().await;
        let mut agent = Agent::new(AgentType::Backend, "anthropic");
        repo.create(&agent).await.unwrap();
        agent.transition_to(AgentStatus::Working).unwrap();
        repo.update(&agent).await.unwrap();
        assert!(repo.list_available().await.unwrap().is_empty());
    }
}
