use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{MemoryItem, MemoryTier};
use crate::domain::ports::MemoryRepository;

pub struct SqliteMemoryRepository {
    pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<MemoryItem> {
        let id: String = row.try_get("id")?;
        let agent_id: String = row.try_get("agent_id")?;
        let project_id: String = row.try_get("project_id")?;
        let tier: String = row.try_get("tier")?;
        Ok(MemoryItem {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            agent_id: Uuid::parse_str(&agent_id).map_err(|e| CoreError::validation(e.to_string()))?,
            project_id: Uuid::parse_str(&project_id).map_err(|e| CoreError::validation(e.to_string()))?,
            tier: MemoryTier::parse_str(&tier)
                .ok_or_else(|| CoreError::validation(format!("unknown memory tier {tier}")))?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            token_count: row.try_get::<i64, _>("token_count")? as u64,
            usage_count: row.try_get::<i64, _>("usage_count")? as u64,
            pinned: row.try_get::<i64, _>("pinned")? != 0,
            importance: row.try_get("importance")?,
            accessed_at: row.try_get::<DateTime<Utc>, _>("accessed_at")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn create(&self, item: &MemoryItem) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO memory_items (id, agent_id, project_id, tier, key, value, token_count,
             usage_count, pinned, importance, accessed_at, created_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(item.id.to_string())
        .bind(item.agent_id.to_string())
        .bind(item.project_id.to_string())
        .bind(item.tier.as_str())
        .bind(&item.key)
        .bind(&item.value)
        .bind(item.token_count as i64)
        .bind(item.usage_count as i64)
        .bind(item.pinned as i64)
        .bind(item.importance)
        .bind(item.accessed_at)
        .bind(item.created_at)
        .bind(item.version as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<MemoryItem> {
        let row = sqlx::query("SELECT * FROM memory_items WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("memory_item", id))?;
        Self::from_row(&row)
    }

    async fn update(&self, item: &MemoryItem) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE memory_items SET tier = ?1, usage_count = ?2, pinned = ?3, importance = ?4,
             accessed_at = ?5, version = ?6
             WHERE id = ?7 AND version = ?8",
        )
        .bind(item.tier.as_str())
        .bind(item.usage_count as i64)
        .bind(item.pinned as i64)
        .bind(item.importance)
        .bind(item.accessed_at)
        .bind(item.version as i64)
        .bind(item.id.to_string())
        .bind((item.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("memory_item", item.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM memory_items WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_agent(&self, agent_id: Uuid, project_id: Uuid) -> CoreResult<Vec<MemoryItem>> {
        let rows = sqlx::query("SELECT * FROM memory_items WHERE agent_id = ?1 AND project_id = ?2")
            .bind(agent_id.to_string())
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_tier(&self, agent_id: Uuid, tier: MemoryTier) -> CoreResult<Vec<MemoryItem>> {
        let rows = sqlx::query("SELECT * FROM memory_items WHERE agent_id = ?1 AND tier = ?2")
            .bind(agent_id.to_string())
            .bind(tier.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn sum_hot_tokens(&self, agent_id: Uuid) -> CoreResult<u64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(token_count) FROM memory_items WHERE agent_id = ?1 AND tier = 'hot'",
        )
        .bind(agent_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;

    async fn repo() -> SqliteMemoryRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        SqliteMemoryRepository::new(pool)
    }

    #[tokio::test]
    async fn sum_hot_tokens_only_counts_hot_tier() {
        let repo = repo().await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();

        let hot = MemoryItem::new(agent_id, project_id, "k1", "v1", 100);
        repo.create(&hot).await.unwrap();

        let mut warm = MemoryItem::new(agent_id, project_id, "k2", "v2", 200);
        warm.retier_down();
        repo.create(&warm).await.unwrap();

        assert_eq!(repo.sum_hot_tokens(agent_id).await.unwrap(), 100);
    }
}
