//! SQLite-backed message store.
//!
//! The store is the only shared mutable resource in the service. Every write
//! goes through [`MessageStore::insert_if_absent`], a single
//! `INSERT ... ON CONFLICT DO NOTHING` statement, so concurrent deliveries of
//! the same `message_id` are ordered by the database: one caller sees
//! [`InsertOutcome::Created`], every other caller sees
//! [`InsertOutcome::Duplicate`].

pub mod types;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use tracing::info;

pub use types::{
    InsertOutcome, Message, MessageFilter, MessagePage, MessageStats, NewMessage, Page,
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool size for file-backed databases.
const MAX_CONNECTIONS: u32 = 8;

const MIGRATIONS: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id  TEXT PRIMARY KEY,
        from_msisdn TEXT NOT NULL,
        to_msisdn   TEXT NOT NULL,
        ts          TEXT NOT NULL,
        text        TEXT,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_ts_id ON messages (ts, message_id);",
    "CREATE INDEX IF NOT EXISTS idx_messages_from ON messages (from_msisdn);",
];

const SELECT_COLUMNS: &str =
    "SELECT message_id, from_msisdn, to_msisdn, ts, text, created_at FROM messages WHERE 1 = 1";

/// Errors surfaced by store operations at request time.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Handle to the message database.
///
/// Cloning is cheap; all clones share one connection pool. Connections are
/// checked out per operation and returned when the operation finishes,
/// whichever way it finishes.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL {}", url))?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is its own database, so keep exactly one.
        let max_connections = if in_memory { 1 } else { MAX_CONNECTIONS };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        let store = Self { pool };
        store.migrate().await?;

        info!(max_connections = max_connections, "message_store_connected");

        Ok(store)
    }

    /// Create the schema if it does not exist yet.
    async fn migrate(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| {
                    format!(
                        "Failed to apply migration: {}",
                        statement.trim().lines().next().unwrap_or_default()
                    )
                })?;
        }
        Ok(())
    }

    /// Insert `message` unless a row with the same id exists.
    ///
    /// This is one atomic statement: there is no window between checking for
    /// the id and writing the row, and a failed call leaves no partial row.
    pub async fn insert_if_absent(&self, message: &NewMessage) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (message_id, from_msisdn, to_msisdn, ts, text)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(&message.message_id)
        .bind(&message.from_msisdn)
        .bind(&message.to_msisdn)
        .bind(&message.ts)
        .bind(&message.text)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Created)
        }
    }

    /// Fetch a single message by id.
    #[cfg(test)]
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT message_id, from_msisdn, to_msisdn, ts, text, created_at FROM messages WHERE message_id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    /// List messages matching `filter`, ordered by `(ts, message_id)`.
    ///
    /// `total` is the number of rows matching the filter, ignoring `page`.
    /// Count and page are read in one transaction so they agree.
    pub async fn list(&self, filter: &MessageFilter, page: Page) -> Result<MessagePage, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages WHERE 1 = 1");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await?;

        let mut page_query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_filters(&mut page_query, filter);
        page_query
            .push(" ORDER BY ts ASC, message_id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);
        let data = page_query
            .build_query_as::<Message>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(MessagePage { data, total })
    }

    /// Total, distinct-sender and distinct-recipient counts.
    pub async fn stats(&self) -> Result<MessageStats, StoreError> {
        let (total_messages, unique_senders, unique_recipients): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT from_msisdn), COUNT(DISTINCT to_msisdn) FROM messages",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MessageStats {
            total_messages,
            unique_senders,
            unique_recipients,
        })
    }

    /// Round-trip a trivial query to check the database is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("message_store_closed");
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &MessageFilter) {
    if let Some(from) = &filter.from_msisdn {
        query.push(" AND from_msisdn = ").push_bind(from.clone());
    }
    if let Some(since) = &filter.since {
        query.push(" AND ts >= ").push_bind(since.clone());
    }
    if let Some(q) = &filter.q {
        query
            .push(" AND lower(text) LIKE '%' || lower(")
            .push_bind(escape_like(q))
            .push(") || '%' ESCAPE '\\'");
    }
}

/// Escape LIKE wildcards so `q` matches as a literal substring.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, MessageStore) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("messages.db").display());
        let store = MessageStore::connect(&url).await.unwrap();
        (dir, store)
    }

    fn message(id: &str, from: &str, to: &str, ts: &str, text: Option<&str>) -> NewMessage {
        NewMessage {
            message_id: id.to_string(),
            from_msisdn: from.to_string(),
            to_msisdn: to.to_string(),
            ts: ts.to_string(),
            text: text.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let (_dir, store) = temp_store().await;
        let first = message("msg_001", "+919876543210", "+14155550100", "2025-01-15T10:00:00Z", Some("Hello"));

        assert_eq!(store.insert_if_absent(&first).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert_if_absent(&first).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.stats().await.unwrap().total_messages, 1);
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let (_dir, store) = temp_store().await;
        let first = message("msg_001", "+911", "+141", "2025-01-15T10:00:00Z", Some("original"));
        let second = message("msg_001", "+922", "+142", "2025-01-16T10:00:00Z", Some("replacement"));

        store.insert_if_absent(&first).await.unwrap();
        assert_eq!(store.insert_if_absent(&second).await.unwrap(), InsertOutcome::Duplicate);

        let stored = store.get("msg_001").await.unwrap().unwrap();
        assert_eq!(stored.text.as_deref(), Some("original"));
        assert_eq!(stored.from_msisdn, "+911");
        assert!(stored.created_at.ends_with('Z'));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_create_one_row() {
        let (_dir, store) = temp_store().await;
        let msg = message("race", "+911", "+141", "2025-01-15T10:00:00Z", None);

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            let msg = msg.clone();
            tokio::spawn(async move { store.insert_if_absent(&msg).await })
        });
        let outcomes: Vec<InsertOutcome> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let created = outcomes.iter().filter(|o| **o == InsertOutcome::Created).count();
        assert_eq!(created, 1);
        assert_eq!(outcomes.len(), 16);
        assert_eq!(store.stats().await.unwrap().total_messages, 1);
    }

    #[tokio::test]
    async fn test_list_orders_by_ts_then_id() {
        let (_dir, store) = temp_store().await;
        store.insert_if_absent(&message("c", "+1", "+2", "2025-01-15T10:00:02Z", None)).await.unwrap();
        store.insert_if_absent(&message("b", "+1", "+2", "2025-01-15T10:00:01Z", None)).await.unwrap();
        store.insert_if_absent(&message("a", "+1", "+2", "2025-01-15T10:00:02Z", None)).await.unwrap();

        let page = store.list(&MessageFilter::default(), Page::default()).await.unwrap();
        let ids: Vec<&str> = page.data.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_list_total_ignores_pagination() {
        let (_dir, store) = temp_store().await;
        for i in 0..5 {
            let id = format!("m{}", i);
            let ts = format!("2025-01-15T10:00:0{}Z", i);
            store.insert_if_absent(&message(&id, "+1", "+2", &ts, None)).await.unwrap();
        }

        let page = store
            .list(&MessageFilter::default(), Page::clamped(Some(2), Some(3)))
            .await
            .unwrap();
        let ids: Vec<&str> = page.data.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m4"]);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn test_list_filters_are_conjunctive() {
        let (_dir, store) = temp_store().await;
        store.insert_if_absent(&message("1", "+911", "+141", "2025-01-15T09:00:00Z", Some("Hello World"))).await.unwrap();
        store.insert_if_absent(&message("2", "+911", "+141", "2025-01-15T11:00:00Z", Some("HELLO again"))).await.unwrap();
        store.insert_if_absent(&message("3", "+922", "+141", "2025-01-15T11:00:00Z", Some("hello there"))).await.unwrap();
        store.insert_if_absent(&message("4", "+911", "+141", "2025-01-15T12:00:00Z", None)).await.unwrap();

        let filter = MessageFilter {
            from_msisdn: Some("+911".to_string()),
            since: Some("2025-01-15T11:00:00Z".to_string()),
            q: Some("hello".to_string()),
        };
        let page = store.list(&filter, Page::default()).await.unwrap();
        let ids: Vec<&str> = page.data.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_text_filter_treats_wildcards_literally() {
        let (_dir, store) = temp_store().await;
        store.insert_if_absent(&message("1", "+1", "+2", "2025-01-15T09:00:00Z", Some("100% sure"))).await.unwrap();
        store.insert_if_absent(&message("2", "+1", "+2", "2025-01-15T10:00:00Z", Some("1000 sure"))).await.unwrap();

        let filter = MessageFilter {
            q: Some("0%".to_string()),
            ..Default::default()
        };
        let page = store.list(&filter, Page::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].message_id, "1");
    }

    #[tokio::test]
    async fn test_stats_counts_distinct_parties() {
        let (_dir, store) = temp_store().await;
        store.insert_if_absent(&message("1", "+911", "+141", "2025-01-15T09:00:00Z", None)).await.unwrap();
        store.insert_if_absent(&message("2", "+922", "+141", "2025-01-15T10:00:00Z", None)).await.unwrap();
        store.insert_if_absent(&message("3", "+911", "+141", "2025-01-15T11:00:00Z", None)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            MessageStats {
                total_messages: 3,
                unique_senders: 2,
                unique_recipients: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_in_memory_store_and_ping() {
        let store = MessageStore::connect("sqlite::memory:").await.unwrap();
        store.ping().await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_messages, 0);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
