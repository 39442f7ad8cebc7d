//! SQLite store for audit events consumed from the `logs` topic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::broker::EventHandler;
use crate::domain::BrokerEvent;
use crate::error::HandlerError;

/// One stored log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Row id, increasing with insertion order.
    pub id: i64,
    /// Raw event payload.
    pub message: String,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed log store using `sqlx::SqlitePool`.
#[derive(Debug, Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Opens `database_url` and makes sure the `logs` table exists.
    ///
    /// # Errors
    ///
    /// Returns the [`sqlx::Error`] if the connection or the table creation
    /// fails.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wraps an existing pool and makes sure the `logs` table exists.
    ///
    /// # Errors
    ///
    /// Returns the [`sqlx::Error`] if the table cannot be created.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                message TEXT NOT NULL, \
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Appends `message` and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns the [`sqlx::Error`] on database failure.
    pub async fn store(&self, message: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO logs (message, created_at) VALUES (?, ?)")
            .bind(message)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Returns up to `limit` entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns the [`sqlx::Error`] on database failure.
    pub async fn recent(&self, limit: u32) -> Result<Vec<LogEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, message, created_at FROM logs \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, message, created_at)| LogEntry {
                id,
                message,
                created_at,
            })
            .collect())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventHandler for LogStore {
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError> {
        let message = event.payload_str();
        let id = self.store(&message).await?;
        tracing::info!(id, key = %event.key, "log stored");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Topic;

    async fn memory_store() -> LogStore {
        let Ok(pool) = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
        else {
            panic!("in-memory sqlite");
        };
        let Ok(store) = LogStore::with_pool(pool).await else {
            panic!("schema");
        };
        store
    }

    #[tokio::test]
    async fn stores_and_lists_newest_first() {
        let store = memory_store().await;
        for msg in ["first", "second", "third"] {
            assert!(store.store(msg).await.is_ok());
        }

        let Ok(recent) = store.recent(2).await else {
            panic!("query");
        };
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second"]);
        assert!(recent.iter().all(|e| e.created_at <= Utc::now()));
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let store = memory_store().await;
        assert!(store.store("kept").await.is_ok());
        let Ok(again) = LogStore::with_pool(store.pool.clone()).await else {
            panic!("second schema pass");
        };
        let Ok(recent) = again.recent(10).await else {
            panic!("query");
        };
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn handler_persists_raw_payload() {
        let store = memory_store().await;
        let Ok(event) = BrokerEvent::json(
            Topic::Logs,
            "u-1",
            &serde_json::json!({"message": "Client connected", "userId": "u-1"}),
        ) else {
            panic!("serializable");
        };

        assert!(store.handle(&event).await.is_ok());

        let Ok(recent) = store.recent(1).await else {
            panic!("query");
        };
        let [entry] = recent.as_slice() else {
            panic!("one row");
        };
        assert!(entry.message.contains("Client connected"));
        assert!(entry.message.contains("u-1"));
    }

    #[tokio::test]
    async fn closed_pool_surfaces_store_error() {
        let store = memory_store().await;
        store.close().await;
        let Ok(event) = BrokerEvent::json(Topic::Logs, "k", &"x") else {
            panic!("serializable");
        };
        assert!(matches!(store.handle(&event).await, Err(HandlerError::Store(_))));
    }
}
