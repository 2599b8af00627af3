//! SQLite backend.
//!
//! One database file with four tables:
//! - `users`: known users
//! - `expenses`: expense records, each owned by a user
//! - `threads`: one row per conversation with its running summary
//! - `thread_messages`: the ordered message log, with a tombstone column
//!
//! Timestamps are stored as RFC 3339 text in UTC with fixed precision, so
//! string comparison orders them correctly.
//!
//! Category and description matching runs in Rust with the same Unicode
//! case folding as the in-memory backend; SQLite's `LOWER` only folds ASCII.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use spendwise_core::error::StoreError;
use spendwise_core::expense::{
    Expense, ExpenseFilter, ExpensePatch, ExpenseStore, NewExpense, UserId, UserRecord,
    same_category,
};
use spendwise_core::message::{Message, MessageToolCall, Role};
use spendwise_core::thread::{ConversationStore, Thread, ThreadId};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const EXPENSE_COLUMNS: &str = "id, user_id, amount, description, category, date";

/// SQLite-backed expense and conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// `sqlite::memory:` gives a private in-process database; the pool is
    /// pinned to a single connection so every query sees the same data.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "users table",
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id        INTEGER PRIMARY KEY,
                    username  TEXT NOT NULL
                )
                "#,
            ),
            (
                "expenses table",
                r#"
                CREATE TABLE IF NOT EXISTS expenses (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id      INTEGER NOT NULL REFERENCES users(id),
                    amount       REAL NOT NULL,
                    description  TEXT NOT NULL DEFAULT '',
                    category     TEXT NOT NULL,
                    date         TEXT NOT NULL
                )
                "#,
            ),
            (
                "expenses index",
                "CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, date)",
            ),
            (
                "threads table",
                r#"
                CREATE TABLE IF NOT EXISTS threads (
                    id          TEXT PRIMARY KEY,
                    summary     TEXT NOT NULL DEFAULT '',
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "thread_messages table",
                r#"
                CREATE TABLE IF NOT EXISTS thread_messages (
                    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id     TEXT NOT NULL REFERENCES threads(id),
                    id            TEXT NOT NULL,
                    role          TEXT NOT NULL,
                    content       TEXT NOT NULL,
                    tool_calls    TEXT NOT NULL DEFAULT '[]',
                    tool_call_id  TEXT,
                    created_at    TEXT NOT NULL,
                    pruned        INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(thread_id, id)
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_expense(row: &SqliteRow) -> Result<Expense, StoreError> {
        let date_str: String = row
            .try_get("date")
            .map_err(|e| StoreError::QueryFailed(format!("date column: {e}")))?;
        Ok(Expense {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
            user_id: UserId(
                row.try_get("user_id")
                    .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?,
            ),
            amount: row
                .try_get("amount")
                .map_err(|e| StoreError::QueryFailed(format!("amount column: {e}")))?,
            description: row
                .try_get("description")
                .map_err(|e| StoreError::QueryFailed(format!("description column: {e}")))?,
            category: row
                .try_get("category")
                .map_err(|e| StoreError::QueryFailed(format!("category column: {e}")))?,
            date: parse_ts(&date_str)?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let role: String = row.try_get("role").map_err(|e| col("role", e))?;
        let tool_calls: String = row.try_get("tool_calls").map_err(|e| col("tool_calls", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;
        let pruned: i64 = row.try_get("pruned").map_err(|e| col("pruned", e))?;

        Ok(Message {
            id: row.try_get("id").map_err(|e| col("id", e))?,
            role: role.parse::<Role>().map_err(StoreError::QueryFailed)?,
            content: row.try_get("content").map_err(|e| col("content", e))?,
            tool_calls: serde_json::from_str::<Vec<MessageToolCall>>(&tool_calls)
                .map_err(|e| StoreError::QueryFailed(format!("tool_calls json: {e}")))?,
            tool_call_id: row.try_get("tool_call_id").map_err(|e| col("tool_call_id", e))?,
            timestamp: parse_ts(&created_at)?,
            pruned: pruned != 0,
        })
    }

    async fn fetch_expense(&self, id: i64) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.as_ref().map(Self::row_to_expense).transpose()
    }

    async fn touch_thread(
        conn: &mut sqlx::SqliteConnection,
        id: &ThreadId,
    ) -> Result<(), StoreError> {
        let now = ts(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO threads (id, summary, created_at, updated_at) VALUES (?, '', ?, ?)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(&now)
        .bind(&now)
        .execute(conn)
        .await
        .map_err(|e| StoreError::Storage(format!("thread upsert: {e}")))?;
        Ok(())
    }

    /// Ids of the user's expenses whose category equals `category` after
    /// trimming and case folding.
    async fn category_ids(
        conn: &mut sqlx::SqliteConnection,
        user: UserId,
        category: &str,
    ) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query("SELECT id, category FROM expenses WHERE user_id = ?")
            .bind(user.0)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut ids = Vec::new();
        for row in &rows {
            let stored: String = row
                .try_get("category")
                .map_err(|e| StoreError::QueryFailed(format!("category column: {e}")))?;
            if same_category(&stored, category) {
                ids.push(
                    row.try_get::<i64, _>("id")
                        .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                );
            }
        }
        Ok(ids)
    }

    async fn tombstone(
        conn: &mut sqlx::SqliteConnection,
        id: &ThreadId,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        for message_id in message_ids {
            sqlx::query("UPDATE thread_messages SET pruned = 1 WHERE thread_id = ? AND id = ?")
                .bind(id.as_str())
                .bind(message_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::Storage(format!("prune: {e}")))?;
        }
        Ok(())
    }

    async fn write_summary(
        conn: &mut sqlx::SqliteConnection,
        id: &ThreadId,
        summary: &str,
    ) -> Result<(), StoreError> {
        let now = ts(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO threads (id, summary, created_at, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET summary = excluded.summary, updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(summary)
        .bind(&now)
        .bind(&now)
        .execute(conn)
        .await
        .map_err(|e| StoreError::Storage(format!("set summary: {e}")))?;
        Ok(())
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

#[async_trait]
impl ExpenseStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn register_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, username) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET username = excluded.username",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("register user: {e}")))?;
        Ok(())
    }

    async fn user_exists(&self, user: UserId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn list(&self, user: UserId, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = "
        ));
        qb.push_bind(user.0);

        if let Some(from) = &filter.from {
            qb.push(" AND date >= ").push_bind(ts(from));
        }
        if let Some(to) = &filter.to {
            qb.push(" AND date <= ").push_bind(ts(to));
        }
        qb.push(" ORDER BY date ASC, id ASC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let expenses = rows
            .iter()
            .map(Self::row_to_expense)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(expenses.into_iter().filter(|e| filter.matches(e)).collect())
    }

    async fn list_by_category(&self, user: UserId, category: &str) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = ? ORDER BY date ASC, id ASC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let expenses = rows
            .iter()
            .map(Self::row_to_expense)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(expenses
            .into_iter()
            .filter(|e| same_category(&e.category, category))
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Expense>, StoreError> {
        self.fetch_expense(id).await
    }

    async fn create(&self, user: UserId, expense: NewExpense) -> Result<Expense, StoreError> {
        expense.validate()?;
        if !self.user_exists(user).await? {
            return Err(StoreError::UnknownUser(user.0));
        }

        let result = sqlx::query(
            "INSERT INTO expenses (user_id, amount, description, category, date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(&expense.category)
        .bind(ts(&expense.date))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("insert expense: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, user = user.0, "Expense created");
        self.fetch_expense(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))
    }

    async fn update(&self, id: i64, patch: &ExpensePatch) -> Result<Expense, StoreError> {
        patch.validate()?;
        let mut expense = self
            .fetch_expense(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))?;
        patch.apply(&mut expense);

        sqlx::query(
            "UPDATE expenses SET amount = ?, description = ?, category = ?, date = ? WHERE id = ?",
        )
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(&expense.category)
        .bind(ts(&expense.date))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("update expense: {e}")))?;

        Ok(expense)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("delete expense: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("expense {id}")));
        }
        Ok(())
    }

    async fn update_by_category(
        &self,
        user: UserId,
        category: &str,
        patch: &ExpensePatch,
    ) -> Result<Vec<Expense>, StoreError> {
        patch.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let ids = Self::category_ids(&mut tx, user, category).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut update: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE expenses SET description = COALESCE(",
        );
        update
            .push_bind(patch.description.clone())
            .push(", description), amount = COALESCE(")
            .push_bind(patch.amount)
            .push(", amount), category = COALESCE(")
            .push_bind(patch.category.clone())
            .push(", category), date = COALESCE(")
            .push_bind(patch.date.as_ref().map(ts))
            .push(", date) WHERE id IN (");
        let mut separated = update.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        update
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("bulk update: {e}")))?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id IN ("
        ));
        let mut separated = select.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY date ASC, id ASC");

        let rows = select
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let updated = rows
            .iter()
            .map(Self::row_to_expense)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        debug!(user = user.0, category, updated = updated.len(), "Bulk update");
        Ok(updated)
    }

    async fn delete_by_category(&self, user: UserId, category: &str) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let ids = Self::category_ids(&mut tx, user, category).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut delete: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM expenses WHERE id IN (");
        let mut separated = delete.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = delete
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("bulk delete: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        let deleted = result.rows_affected() as usize;
        debug!(user = user.0, category, deleted, "Bulk delete");
        Ok(deleted)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &ThreadId) -> Result<Thread, StoreError> {
        let header = sqlx::query("SELECT summary, created_at, updated_at FROM threads WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let Some(header) = header else {
            return Ok(Thread::new(id.clone()));
        };

        let summary: String = header
            .try_get("summary")
            .map_err(|e| StoreError::QueryFailed(format!("summary column: {e}")))?;
        let created_at: String = header
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = header
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        let rows = sqlx::query(
            "SELECT id, role, content, tool_calls, tool_call_id, created_at, pruned
             FROM thread_messages WHERE thread_id = ? ORDER BY seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Thread {
            id: id.clone(),
            messages,
            summary,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    async fn append(&self, id: &ThreadId, messages: &[Message]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        Self::touch_thread(&mut tx, id).await?;

        for message in messages {
            let tool_calls = serde_json::to_string(&message.tool_calls)
                .map_err(|e| StoreError::Storage(format!("tool_calls json: {e}")))?;
            sqlx::query(
                "INSERT INTO thread_messages
                 (thread_id, id, role, content, tool_calls, tool_call_id, created_at, pruned)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(&message.id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(tool_calls)
            .bind(message.tool_call_id.as_deref())
            .bind(ts(&message.timestamp))
            .bind(message.pruned as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("insert message: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        debug!(thread = %id, count = messages.len(), "Messages appended");
        Ok(())
    }

    async fn prune(&self, id: &ThreadId, message_ids: &[String]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;
        Self::tombstone(&mut tx, id, message_ids).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(())
    }

    async fn set_summary(&self, id: &ThreadId, summary: &str) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Storage(format!("acquire: {e}")))?;
        Self::write_summary(&mut conn, id, summary).await
    }

    async fn compact(
        &self,
        id: &ThreadId,
        summary: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;
        Self::tombstone(&mut tx, id, message_ids).await?;
        Self::write_summary(&mut tx, id, summary).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        debug!(thread = %id, pruned = message_ids.len(), "Thread compacted");
        Ok(())
    }
}
