pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewReceipt, Receipt, ReceiptRecord, RecentReceipt, Role, Tag, TagKey, UserWithRoles,
};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key was violated. Tag resolution recovers from this by
    /// re-reading; user creation maps it to a duplicate-email rejection.
    #[error("unique constraint violated")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOrder {
    /// Interactive reports: "what's new" first.
    NewestFirst,
    /// Exports: natural reading order for a running ledger.
    OldestFirst,
}

#[derive(Debug, Clone)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: Decimal,
}

/// One internally consistent read of the dashboard numbers.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub total_amount: Decimal,
    pub total_receipts: i64,
    pub categories: Vec<CategoryTotal>,
    pub recent: Vec<RecentReceipt>,
}

/// The queryable receipt ledger. Production talks to Postgres; tests run
/// against the in-memory backend, which mirrors the same semantics
/// (including the conditional tag insert).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Users
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserWithRoles>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserWithRoles>, StoreError>;
    async fn list_users(&self) -> Result<Vec<UserWithRoles>, StoreError>;
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        roles: &[Role],
    ) -> Result<UserWithRoles, StoreError>;
    async fn update_user_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError>;
    /// Returns false if no such user existed.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    // Receipts
    async fn insert_receipt(&self, new: NewReceipt) -> Result<Receipt, StoreError>;
    async fn receipt_exists(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn receipt_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, StoreError>;
    /// All receipts newest-first, optionally filtered by a case-insensitive
    /// search over note, category, and tag name.
    async fn search_receipts(&self, search: Option<&str>)
        -> Result<Vec<ReceiptRecord>, StoreError>;
    /// Receipts with `from <= created_at < until`. The half-open window puts
    /// a period's first instant and last millisecond in the same period.
    async fn receipts_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        order: ReceiptOrder,
    ) -> Result<Vec<ReceiptRecord>, StoreError>;
    /// Receipts linked to any tag with the given name, regardless of month
    /// scope, newest-first.
    async fn receipts_with_tag(&self, name: &str) -> Result<Vec<ReceiptRecord>, StoreError>;

    // Tags
    async fn find_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError>;
    /// Conditional insert: returns the created tag, or None when an
    /// identical key already exists (the caller re-reads).
    async fn try_insert_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError>;
    /// Idempotent attach; returns false when the association already existed.
    async fn link_receipt_tag(&self, receipt_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError>;

    async fn dashboard_snapshot(&self, recent_limit: i64) -> Result<DashboardSnapshot, StoreError>;
}
