//! Expense domain types and the expense store trait.
//!
//! Every expense belongs to exactly one user, and every store operation is
//! scoped by a [`UserId`].

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
}

/// A persisted expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: UserId,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: DateTime<Utc>,
}

impl Expense {
    /// One-line rendering used in tool output.
    pub fn summary_line(&self) -> String {
        format!(
            "ID: {} | Description: {} | Amount: ${:.2} | Category: {} | User ID: {} | Date: {}",
            self.id,
            self.description,
            self.amount,
            self.category,
            self.user_id,
            self.date.format("%Y-%m-%d"),
        )
    }
}

/// Fields for a new expense; the owner is passed separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_amount(self.amount)?;
        validate_category(&self.category)
    }
}

/// Partial update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpensePatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl ExpensePatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.date.is_none()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.is_empty() {
            return Err(StoreError::Invalid("no fields to update".into()));
        }
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        Ok(())
    }

    pub fn apply(&self, expense: &mut Expense) {
        if let Some(description) = &self.description {
            expense.description = description.clone();
        }
        if let Some(amount) = self.amount {
            expense.amount = amount;
        }
        if let Some(category) = &self.category {
            expense.category = category.clone();
        }
        if let Some(date) = self.date {
            expense.date = date;
        }
    }
}

fn validate_amount(amount: f64) -> Result<(), StoreError> {
    if amount.is_finite() {
        Ok(())
    } else {
        Err(StoreError::Invalid("amount must be a finite number".into()))
    }
}

fn validate_category(category: &str) -> Result<(), StoreError> {
    if category.trim().is_empty() {
        Err(StoreError::Invalid("category must not be empty".into()))
    } else {
        Ok(())
    }
}

/// Filters for listing a user's expenses. All bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseFilter {
    /// Case-insensitive substring match on category
    pub category_contains: Option<String>,
    /// Case-insensitive substring match on description
    pub description_contains: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        if let Some(needle) = &self.category_contains
            && !contains_ignore_case(&expense.category, needle)
        {
            return false;
        }
        if let Some(needle) = &self.description_contains
            && !contains_ignore_case(&expense.description, needle)
        {
            return false;
        }
        if self.from.is_some_and(|from| expense.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| expense.date > to) {
            return false;
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Exact category comparison used by bulk update and delete.
pub fn same_category(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Persistence for users and their expenses.
///
/// Bulk operations are atomic: they either change every matched record or
/// none of them.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Insert or refresh a user.
    async fn register_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn user_exists(&self, user: UserId) -> Result<bool, StoreError>;

    /// A user's expenses matching the filter, ordered by date then id.
    async fn list(&self, user: UserId, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError>;

    /// A user's expenses in exactly this category (case-insensitive).
    async fn list_by_category(&self, user: UserId, category: &str) -> Result<Vec<Expense>, StoreError>;

    /// Fetch by id regardless of owner. Callers enforce ownership.
    async fn get(&self, id: i64) -> Result<Option<Expense>, StoreError>;

    async fn create(&self, user: UserId, expense: NewExpense) -> Result<Expense, StoreError>;

    /// Update one expense; `NotFound` if it does not exist.
    async fn update(&self, id: i64, patch: &ExpensePatch) -> Result<Expense, StoreError>;

    /// Delete one expense; `NotFound` if it does not exist.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Apply the patch to every expense of `user` in `category`. Returns the
    /// updated records; empty when nothing matched.
    async fn update_by_category(
        &self,
        user: UserId,
        category: &str,
        patch: &ExpensePatch,
    ) -> Result<Vec<Expense>, StoreError>;

    /// Delete every expense of `user` in `category`. Returns the count.
    async fn delete_by_category(&self, user: UserId, category: &str) -> Result<usize, StoreError>;
}
