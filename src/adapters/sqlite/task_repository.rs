use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{QualityGateStatus, Task, TaskPriority, TaskStatus};
use crate::domain::ports::TaskRepository;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn dependencies_of(pool: &SqlitePool, task_id: Uuid) -> CoreResult<Vec<Uuid>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1")
                .bind(task_id.to_string())
                .fetch_all(pool)
                .await?;
        rows.iter()
            .map(|s| Uuid::parse_str(s).map_err(|e| CoreError::validation(e.to_string())))
            .collect()
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Task> {
        let id: String = row.try_get("id")?;
        let project_id: String = row.try_get("project_id")?;
        let status: String = row.try_get("status")?;
        let priority: String = row.try_get("priority")?;
        let assigned_to: Option<String> = row.try_get("assigned_to")?;
        let quality_gate_status: String = row.try_get("quality_gate_status")?;
        let quality_gate_failures: String = row.try_get("quality_gate_failures")?;

        Ok(Task {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::validation(e.to_string()))?,
            project_id: Uuid::parse_str(&project_id).map_err(|e| CoreError::validation(e.to_string()))?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            agent_type: row.try_get("agent_type")?,
            status: TaskStatus::parse_str(&status)
                .ok_or_else(|| CoreError::validation(format!("unknown task status {status}")))?,
            priority: TaskPriority::parse_str(&priority)
                .ok_or_else(|| CoreError::validation(format!("unknown task priority {priority}")))?,
            assigned_to: assigned_to
                .map(|s| Uuid::parse_str(&s).map_err(|e| CoreError::validation(e.to_string())))
                .transpose()?,
            depends_on: Vec::new(),
            quality_gate_status: QualityGateStatus::parse_str(&quality_gate_status).ok_or_else(|| {
                CoreError::validation(format!("unknown quality gate status {quality_gate_status}"))
            })?,
            quality_gate_failures: serde_json::from_str(&quality_gate_failures)
                .map_err(|e| CoreError::validation(e.to_string()))?,
            self_correct_attempts: row.try_get::<i64, _>("self_correct_attempts")? as u32,
            max_self_correct_attempts: row.try_get::<i64, _>("max_self_correct_attempts")? as u32,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
            completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
            version: row.try_get::<i64, _>("version")? as u64,
        })
    }

    async fn hydrate(&self, mut task: Task) -> CoreResult<Task> {
        task.depends_on = Self::dependencies_of(&self.pool, task.id).await?;
        Ok(task)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> CoreResult<()> {
        if !task.depends_on.is_empty() {
            let mut project_tasks = self.list_by_project(task.project_id).await?;
            project_tasks.push(task.clone());
            if let Some(cycle_id) = crate::domain::models::detect_cycle(&project_tasks) {
                return Err(CoreError::validation(format!(
                    "task {} would introduce a depends_on cycle through {cycle_id}",
                    task.id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO tasks (
                id, project_id, title, description, agent_type, status, priority, assigned_to,
                quality_gate_status, quality_gate_failures, self_correct_attempts, max_self_correct_attempts,
                idempotency_key, created_at, updated_at, started_at, completed_at, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        )
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.agent_type)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.assigned_to.map(|u| u.to_string()))
        .bind(task.quality_gate_status.as_str())
        .bind(serde_json::to_string(&task.quality_gate_failures).unwrap())
        .bind(task.self_correct_attempts as i64)
        .bind(task.max_self_correct_attempts as i64)
        .bind(&task.idempotency_key)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.version as i64)
        .execute(&mut *tx)
        .await?;

        for dep in &task.depends_on {
            sqlx::query("INSERT INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)")
                .bind(task.id.to_string())
                .bind(dep.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Task> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::not_found("task", id))?;
        self.hydrate(Self::from_row(&row)?).await
    }

    async fn update(&self, task: &Task) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, priority = ?2, assigned_to = ?3, quality_gate_status = ?4,
             quality_gate_failures = ?5, self_correct_attempts = ?6, updated_at = ?7, started_at = ?8,
             completed_at = ?9, version = ?10
             WHERE id = ?11 AND version = ?12",
        )
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.assigned_to.map(|u| u.to_string()))
        .bind(task.quality_gate_status.as_str())
        .bind(serde_json::to_string(&task.quality_gate_failures).unwrap())
        .bind(task.self_correct_attempts as i64)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.version as i64)
        .bind(task.id.to_string())
        .bind((task.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::concurrency_conflict("task", task.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?1 OR depends_on_task_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE project_id = ?1 ORDER BY created_at ASC")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.hydrate(Self::from_row(row)?).await?);
        }
        Ok(tasks)
    }

    async fn list_by_status(&self, project_id: Uuid, status: TaskStatus) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE project_id = ?1 AND status = ?2 ORDER BY created_at ASC",
        )
        .bind(project_id.to_string())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.hydrate(Self::from_row(row)?).await?);
        }
        Ok(tasks)
    }

    async fn list_by_assignee(&self, agent_id: Uuid) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE assigned_to = ?1 ORDER BY created_at ASC")
            .bind(agent_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.hydrate(Self::from_row(row)?).await?);
        }
        Ok(tasks)
    }

    async fn get_ready_tasks(&self, project_id: Uuid, limit: u32) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT t.* FROM tasks t
             WHERE t.project_id = ?1 AND t.status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM task_dependencies d
                   JOIN tasks dep ON dep.id = d.depends_on_task_id
                   WHERE d.task_id = t.id AND dep.status != 'completed'
               )
             ORDER BY CASE t.priority
                 WHEN 'critical' THEN 0
                 WHEN 'high' THEN 1
                 WHEN 'normal' THEN 2
                 WHEN 'low' THEN 3
                 ELSE 4
             END ASC, t.created_at ASC, t.id ASC
             LIMIT ?2",
        )
        .bind(project_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.hydrate(Self::from_row(row)?).await?);
        }
        Ok(tasks)
    }

    async fn claim_next_ready_task(&self, project_id: Uuid, agent_id: Uuid) -> CoreResult<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT t.* FROM tasks t
             WHERE t.project_id = ?1 AND t.status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM task_dependencies d
                   JOIN tasks dep ON dep.id = d.depends_on_task_id
                   WHERE d.task_id = t.id AND dep.status != 'completed'
               )
             ORDER BY CASE t.priority
                 WHEN 'critical' THEN 0
                 WHEN 'high' THEN 1
                 WHEN 'normal' THEN 2
                 WHEN 'low' THEN 3
                 ELSE 4
             END ASC, t.created_at ASC, t.id ASC
             LIMIT 1",
        )
        .bind(project_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut task = Self::from_row(&row)?;
        let prev_version = task.version;
        task.assign_to(agent_id).map_err(CoreError::validation)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, assigned_to = ?2, updated_at = ?3, version = ?4
             WHERE id = ?5 AND version = ?6",
        )
        .bind(task.status.as_str())
        .bind(task.assigned_to.map(|u| u.to_string()))
        .bind(task.updated_at)
        .bind(task.version as i64)
        .bind(task.id.to_string())
        .bind(prev_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(CoreError::concurrency_conflict("task", task.id));
        }

        tx.commit().await?;
        let task = self.hydrate(task).await?;
        Ok(Some(task))
    }

    async fn find_by_idempotency_key(&self, project_id: Uuid, key: &str) -> CoreResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE project_id = ?1 AND idempotency_key = ?2")
            .bind(project_id.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(Self::from_row(&row)?).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;

    async fn repo() -> SqliteTaskRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        SqliteTaskRepository::new(pool)
    }

    fn project_id() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn ready_tasks_exclude_blocked_dependencies() {
        let repo = repo().await;
        let pid = project_id();

        let blocker = Task::new(pid, "foundation", "backend");
        repo.create(&blocker).await.unwrap();

        let dependent = Task::new(pid, "feature", "backend").with_dependencies(vec![blocker.id]);
        repo.create(&dependent).await.unwrap();

        let ready = repo.get_ready_tasks(pid, 10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, blocker.id);
    }

    #[tokio::test]
    async fn ready_tasks_ordered_by_priority_then_created_at() {
        let repo = repo().await;
        let pid = project_id();

        let low = Task::new(pid, "low-pri", "backend").with_priority(TaskPriority::Low);
        repo.create(&low).await.unwrap();
        let critical = Task::new(pid, "critical-pri", "backend").with_priority(TaskPriority::Critical);
        repo.create(&critical).await.unwrap();

        let ready = repo.get_ready_tasks(pid, 10).await.unwrap();
        assert_eq!(ready[0].id, critical.id);
        assert_eq!(ready[1].id, low.id);
    }

    #[tokio::test]
    async fn claim_assigns_and_is_exclusive() {
        let repo = repo().await;
        let pid = project_id();
        let task = Task::new(pid, "solo", "backend");
        repo.create(&task).await.unwrap();

        let agent_id = Uuid::new_v4();
        let claimed = repo.claim_next_ready_task(pid, agent_id).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Assigned);
        assert_eq!(claimed.assigned_to, Some(agent_id));

        let second = repo.claim_next_ready_task(pid, Uuid::new_v4()).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn dependency_completion_unblocks_dependent() {
        let repo = repo().await;
        let pid = project_id();
        let mut blocker = Task::new(pid, "foundation", "backend");
        repo.create(&blocker).await.unwrap();
        let dependent = Task::new(pid, "feature", "backend").with_dependencies(vec![blocker.id]);
        repo.create(&dependent).await.unwrap();

        assert!(repo.get_ready_tasks(pid, 10).await.unwrap().iter().all(|t| t.id != dependent.id));

        blocker.transition_to(TaskStatus::Assigned).unwrap();
        blocker.transition_to(TaskStatus::InProgress).unwrap();
        blocker.transition_to(TaskStatus::Completed).unwrap();
        repo.update(&blocker).await.unwrap();

        let ready = repo.get_ready_tasks(pid, 10).await.unwrap();
        assert!(ready.iter().any(|t| t.id == dependent.id));
    }
}
