//! Persistence for Spendwise: the expense store and the conversation store.
//!
//! Two backends are provided:
//! - [`SqliteStore`]: sqlx SQLite, one database holding users, expenses and threads
//! - [`InMemoryStore`]: process-local, for tests and throwaway sessions
//!
//! Each backend implements both `ExpenseStore` and `ConversationStore`.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use spendwise_core::error::StoreError;
use spendwise_core::expense::ExpenseStore;
use spendwise_core::thread::ConversationStore;
use std::sync::Arc;
use tracing::info;

/// Handles to both stores, usually backed by the same object.
#[derive(Clone)]
pub struct Stores {
    pub expenses: Arc<dyn ExpenseStore>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl Stores {
    /// Both stores backed by a single value.
    pub fn shared<S>(store: S) -> Self
    where
        S: ExpenseStore + ConversationStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            expenses: store.clone(),
            conversations: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::shared(InMemoryStore::new())
    }
}

/// Open the backend named by a database URL.
///
/// `memory` (or `memory://`) selects [`InMemoryStore`]; anything else is handed
/// to sqlx as a SQLite URL.
pub async fn open(url: &str) -> Result<Stores, StoreError> {
    if url == "memory" || url == "memory://" {
        info!("Using in-memory store");
        return Ok(Stores::in_memory());
    }

    let store = SqliteStore::new(url).await?;
    Ok(Stores::shared(store))
}
