//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use spendwise_core::error::StoreError;
use spendwise_core::expense::{
    Expense, ExpenseFilter, ExpensePatch, ExpenseStore, NewExpense, UserId, UserRecord,
    same_category,
};
use spendwise_core::message::Message;
use spendwise_core::thread::{ConversationStore, Thread, ThreadId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    users: HashMap<UserId, UserRecord>,
    expenses: BTreeMap<i64, Expense>,
    next_id: i64,
}

/// Keeps users, expenses and threads in process memory.
///
/// Every call takes the relevant lock once, so each operation is atomic.
pub struct InMemoryStore {
    ledger: Arc<RwLock<Ledger>>,
    threads: Arc<RwLock<HashMap<ThreadId, Thread>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger {
                next_id: 1,
                ..Ledger::default()
            })),
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut expenses: Vec<Expense>) -> Vec<Expense> {
    expenses.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    expenses
}

#[async_trait]
impl ExpenseStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn register_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.ledger.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_exists(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self.ledger.read().await.users.contains_key(&user))
    }

    async fn list(&self, user: UserId, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError> {
        let ledger = self.ledger.read().await;
        Ok(sorted(
            ledger
                .expenses
                .values()
                .filter(|e| e.user_id == user && filter.matches(e))
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_category(&self, user: UserId, category: &str) -> Result<Vec<Expense>, StoreError> {
        let ledger = self.ledger.read().await;
        Ok(sorted(
            ledger
                .expenses
                .values()
                .filter(|e| e.user_id == user && same_category(&e.category, category))
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: i64) -> Result<Option<Expense>, StoreError> {
        Ok(self.ledger.read().await.expenses.get(&id).cloned())
    }

    async fn create(&self, user: UserId, expense: NewExpense) -> Result<Expense, StoreError> {
        expense.validate()?;
        let mut ledger = self.ledger.write().await;
        if !ledger.users.contains_key(&user) {
            return Err(StoreError::UnknownUser(user.0));
        }
        let id = ledger.next_id;
        ledger.next_id += 1;
        let record = Expense {
            id,
            user_id: user,
            amount: expense.amount,
            description: expense.description,
            category: expense.category,
            date: expense.date,
        };
        ledger.expenses.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, patch: &ExpensePatch) -> Result<Expense, StoreError> {
        patch.validate()?;
        let mut ledger = self.ledger.write().await;
        let expense = ledger
            .expenses
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))?;
        patch.apply(expense);
        Ok(expense.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.ledger
            .write()
            .await
            .expenses
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))
    }

    async fn update_by_category(
        &self,
        user: UserId,
        category: &str,
        patch: &ExpensePatch,
    ) -> Result<Vec<Expense>, StoreError> {
        patch.validate()?;
        let mut ledger = self.ledger.write().await;
        let mut updated = Vec::new();
        for expense in ledger
            .expenses
            .values_mut()
            .filter(|e| e.user_id == user && same_category(&e.category, category))
        {
            patch.apply(expense);
            updated.push(expense.clone());
        }
        Ok(sorted(updated))
    }

    async fn delete_by_category(&self, user: UserId, category: &str) -> Result<usize, StoreError> {
        let mut ledger = self.ledger.write().await;
        let before = ledger.expenses.len();
        ledger
            .expenses
            .retain(|_, e| !(e.user_id == user && same_category(&e.category, category)));
        Ok(before - ledger.expenses.len())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, id: &ThreadId) -> Result<Thread, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| Thread::new(id.clone())))
    }

    async fn append(&self, id: &ThreadId, messages: &[Message]) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(id.clone())
            .or_insert_with(|| Thread::new(id.clone()));
        thread.messages.extend_from_slice(messages);
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn prune(&self, id: &ThreadId, message_ids: &[String]) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(id) {
            tombstone(thread, message_ids);
        }
        Ok(())
    }

    async fn set_summary(&self, id: &ThreadId, summary: &str) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(id.clone())
            .or_insert_with(|| Thread::new(id.clone()));
        thread.summary = summary.to_string();
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn compact(
        &self,
        id: &ThreadId,
        summary: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(id.clone())
            .or_insert_with(|| Thread::new(id.clone()));
        thread.summary = summary.to_string();
        tombstone(thread, message_ids);
        Ok(())
    }
}

fn tombstone(thread: &mut Thread, message_ids: &[String]) {
    for message in thread
        .messages
        .iter_mut()
        .filter(|m| message_ids.contains(&m.id))
    {
        message.pruned = true;
    }
    thread.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_user() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .register_user(&UserRecord { id: UserId(1), username: "alice".into() })
            .await
            .unwrap();
        store
    }

    fn food(amount: f64) -> NewExpense {
        NewExpense {
            amount,
            category: "Food".into(),
            description: "Groceries".into(),
            date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = store_with_user().await;
        let a = store.create(UserId(1), food(1.0)).await.unwrap();
        let b = store.create(UserId(1), food(2.0)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn unknown_user_cannot_create() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.create(UserId(5), food(1.0)).await,
            Err(StoreError::UnknownUser(5))
        ));
    }

    #[tokio::test]
    async fn bulk_delete_returns_count() {
        let store = store_with_user().await;
        store.create(UserId(1), food(1.0)).await.unwrap();
        store.create(UserId(1), food(2.0)).await.unwrap();
        assert_eq!(store.delete_by_category(UserId(1), "FOOD").await.unwrap(), 2);
        assert_eq!(store.delete_by_category(UserId(1), "FOOD").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_patch_changes_nothing() {
        let store = store_with_user().await;
        let e = store.create(UserId(1), food(1.0)).await.unwrap();
        let patch = ExpensePatch {
            amount: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(store.update_by_category(UserId(1), "Food", &patch).await.is_err());
        assert_eq!(store.get(e.id).await.unwrap().unwrap().amount, 1.0);
    }

    #[tokio::test]
    async fn prune_tombstones_only_named_messages() {
        let store = InMemoryStore::new();
        let id = ThreadId::new("t");
        let msgs = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        store.append(&id, &msgs).await.unwrap();
        store.prune(&id, &[msgs[0].id.clone()]).await.unwrap();

        let thread = store.load(&id).await.unwrap();
        assert_eq!(thread.messages.len(), 3);
        let retained: Vec<_> = thread.retained().map(|m| m.content.as_str()).collect();
        assert_eq!(retained, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn summary_is_overwritten() {
        let store = InMemoryStore::new();
        let id = ThreadId::new("t");
        store.set_summary(&id, "first").await.unwrap();
        store.set_summary(&id, "second").await.unwrap();
        assert_eq!(store.load(&id).await.unwrap().summary, "second");
    }

    #[tokio::test]
    async fn compact_sets_summary_and_prunes_together() {
        let store = InMemoryStore::new();
        let id = ThreadId::new("t");
        let msgs = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        store.append(&id, &msgs).await.unwrap();
        store
            .compact(&id, "User said a.", &[msgs[0].id.clone(), msgs[1].id.clone()])
            .await
            .unwrap();

        let thread = store.load(&id).await.unwrap();
        assert_eq!(thread.summary, "User said a.");
        assert_eq!(thread.retained_count(), 1);
    }
}
