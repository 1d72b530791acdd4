use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Event, EventType};
use crate::domain::ports::EventRepository;

pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Event> {
        let project_id: Option<String> = row.try_get("project_id")?;
        let event_type: String = row.try_get("event_type")?;
        let payload: String = row.try_get("payload")?;
        Ok(Event {
            seq: row.try_get::<i64, _>("seq")? as u64,
            project_id: project_id
                .map(|s| Uuid::parse_str(&s).map_err(|e| CoreError::validation(e.to_string())))
                .transpose()?,
            event_type: EventType::parse_str(&event_type)
                .ok_or_else(|| CoreError::validation(format!("unknown event type {event_type}")))?,
            payload: serde_json::from_str(&payload).map_err(|e| CoreError::validation(e.to_string()))?,
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        })
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn append(&self, event: &Event) -> CoreResult<u64> {
        let result = sqlx::query(
            "INSERT INTO events (project_id, event_type, payload, timestamp) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(event.project_id.map(|u| u.to_string()))
        .bind(event.event_type.as_str())
        .bind(serde_json::to_string(&event.payload).unwrap())
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid() as u64)
    }

    async fn list_since(&self, project_id: Uuid, since_seq: u64) -> CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE (project_id = ?1 OR project_id IS NULL) AND seq > ?2 ORDER BY seq ASC",
        )
        .bind(project_id.to_string())
        .bind(since_seq as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_seq(&self) -> CoreResult<u64> {
        let seq: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM events").fetch_one(&self.pool).await?;
        Ok(seq.unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;

    #[tokio::test]
    async fn append_assigns_monotonic_seq() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let repo = SqliteEventRepository::new(pool);
        let project_id = Uuid::new_v4();

        let e1 = Event::new(0, Some(project_id), EventType::ProjectCreated, serde_json::json!({}));
        let seq1 = repo.append(&e1).await.unwrap();
        let e2 = Event::new(0, Some(project_id), EventType::TaskCreated, serde_json::json!({}));
        let seq2 = repo.append(&e2).await.unwrap();

        assert!(seq2 > seq1);
    }

    #[tokio::test]
    async fn list_since_excludes_prior_events() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let repo = SqliteEventRepository::new(pool);
        let project_id = Uuid::new_v4();

        let e1 = Event::new(0, Some(project_id), EventType::ProjectCreated, serde_json::json!({}));
        let seq1 = repo.append(&e1).await.unwrap();
        let e2 = Event::new(0, Some(project_id), EventType::TaskCreated, serde_json::json!({}));
        repo.append(&e2).await.unwrap();

        let events = repo.list_since(project_id, seq1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::TaskCreated);
    }
}
