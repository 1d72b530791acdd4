//! Forward-only, numbered schema migrations.

use sqlx::SqlitePool;

/// A single forward-only migration step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create schema_migrations",
        sql: r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        ",
    },
    Migration {
        version: 2,
        description: "create projects",
        sql: r"
            CREATE TABLE projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                phase TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 3,
        description: "create agents",
        sql: r"
            CREATE TABLE agents (
                id TEXT PRIMARY KEY,
                agent_type TEXT NOT NULL,
                provider TEXT NOT NULL,
                maturity TEXT NOT NULL,
                status TEXT NOT NULL,
                context_tokens INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 4,
        description: "create project_agents",
        sql: r"
            CREATE TABLE project_agents (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                agent_id TEXT NOT NULL REFERENCES agents(id),
                role TEXT NOT NULL,
                assigned_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(project_id, agent_id, is_active)
            );
        ",
    },
    Migration {
        version: 5,
        description: "create tasks",
        sql: r"
            CREATE TABLE tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                agent_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                assigned_to TEXT REFERENCES agents(id),
                quality_gate_status TEXT NOT NULL,
                quality_gate_failures TEXT NOT NULL DEFAULT '[]',
                self_correct_attempts INTEGER NOT NULL DEFAULT 0,
                max_self_correct_attempts INTEGER NOT NULL DEFAULT 3,
                idempotency_key TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(project_id, idempotency_key)
            );
        ",
    },
    Migration {
        version: 6,
        description: "create task_dependencies",
        sql: r"
            CREATE TABLE task_dependencies (
                task_id TEXT NOT NULL REFERENCES tasks(id),
                depends_on_task_id TEXT NOT NULL REFERENCES tasks(id),
                PRIMARY KEY (task_id, depends_on_task_id)
            );
        ",
    },
    Migration {
        version: 7,
        description: "create blockers",
        sql: r"
            CREATE TABLE blockers (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                agent_id TEXT NOT NULL REFERENCES agents(id),
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                prompt TEXT NOT NULL,
                answer TEXT,
                deadline TEXT,
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 8,
        description: "create memory_items",
        sql: r"
            CREATE TABLE memory_items (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL REFERENCES agents(id),
                project_id TEXT NOT NULL REFERENCES projects(id),
                tier TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                usage_count INTEGER NOT NULL DEFAULT 0,
                pinned INTEGER NOT NULL DEFAULT 0,
                importance REAL NOT NULL DEFAULT 0.0,
                accessed_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 9,
        description: "create checkpoints",
        sql: r"
            CREATE TABLE checkpoints (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                git_ref TEXT,
                state_snapshot BLOB NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 10,
        description: "create review_reports",
        sql: r"
            CREATE TABLE review_reports (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                fingerprint TEXT NOT NULL,
                issues TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(task_id, fingerprint)
            );
        ",
    },
    Migration {
        version: 11,
        description: "create events",
        sql: r"
            CREATE TABLE events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source_process_id TEXT
            );
        ",
    },
    Migration {
        version: 12,
        description: "index tasks and events for hot-path queries",
        sql: r"
            CREATE INDEX idx_tasks_project_status ON tasks(project_id, status);
            CREATE INDEX idx_events_project_seq ON events(project_id, seq);
            CREATE INDEX idx_memory_items_agent_tier ON memory_items(agent_id, tier);
        ",
    },
];

/// Applies every migration in `MIGRATIONS` not yet recorded in
/// `schema_migrations`, in version order.
pub struct Migrator;

impl Migrator {
    pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // The bootstrap migration creates schema_migrations itself, so it
        // always runs unconditionally before we can query applied versions.
        sqlx::query(MIGRATIONS[0].sql).execute(pool).await?;
        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?1, ?2)")
            .bind(MIGRATIONS[0].version)
            .bind(MIGRATIONS[0].description)
            .execute(pool)
            .await?;

        let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
            .fetch_all(pool)
            .await?;

        for migration in MIGRATIONS.iter().skip(1) {
            if applied.contains(&migration.version) {
                continue;
            }
            tracing::info!(version = migration.version, description = migration.description, "applying migration");
            sqlx::query(migration.sql).execute(pool).await?;
            sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?1, ?2)")
                .bind(migration.version)
                .bind(migration.description)
                .execute(pool)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;

    #[tokio::test]
    async fn migrator_creates_all_tables() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "schema_migrations",
            "projects",
            "agents",
            "project_agents",
            "tasks",
            "task_dependencies",
            "blockers",
            "memory_items",
            "checkpoints",
            "review_reports",
            "events",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn migrator_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        Migrator::run(&pool).await.unwrap();
    }
}
