use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CategoryTotal, DashboardSnapshot, LedgerStore, ReceiptOrder, StoreError};
use crate::models::{
    NewReceipt, Receipt, ReceiptRecord, RecentReceipt, Role, Tag, TagKey, Uploader, UploaderName,
    UserWithRoles,
};

/// In-memory ledger mirroring the Postgres semantics, including the
/// conditional tag insert and idempotent linking. Unit and integration tests
/// run the whole router against it; the seeding helpers let them plant users
/// and receipts with explicit timestamps.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<UserWithRoles>,
    receipts: Vec<StoredReceipt>,
    tags: Vec<Tag>,
    links: HashSet<(Uuid, Uuid)>,
    seq: u64,
}

struct StoredReceipt {
    receipt: Receipt,
    seq: u64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("ledger mutex poisoned")
    }

    pub fn seed_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        roles: &[Role],
    ) -> UserWithRoles {
        let user = UserWithRoles {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
            roles: roles.to_vec(),
        };
        self.lock().users.push(user.clone());
        user
    }

    pub fn seed_receipt(&self, new: NewReceipt, created_at: DateTime<Utc>) -> Receipt {
        let mut inner = self.lock();
        inner.seq += 1;
        let receipt = Receipt {
            id: Uuid::new_v4(),
            amount: new.amount,
            category: new.category,
            payment_mode: new.payment_mode,
            note: new.note,
            image_url: new.image_url,
            uploaded_by: new.uploaded_by,
            created_at,
        };
        let seq = inner.seq;
        inner.receipts.push(StoredReceipt {
            receipt: receipt.clone(),
            seq,
        });
        receipt
    }

    pub fn tag_count(&self) -> usize {
        self.lock().tags.len()
    }

    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }
}

impl Inner {
    fn record(&self, stored: &StoredReceipt) -> ReceiptRecord {
        let receipt = &stored.receipt;
        let uploader = self
            .users
            .iter()
            .find(|u| u.id == receipt.uploaded_by)
            .map(|u| Uploader {
                name: u.name.clone(),
                email: u.email.clone(),
            })
            .unwrap_or_else(|| Uploader {
                name: "Unknown".to_string(),
                email: String::new(),
            });

        let mut tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|t| self.links.contains(&(receipt.id, t.id)))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        ReceiptRecord {
            id: receipt.id,
            amount: receipt.amount,
            category: receipt.category.clone(),
            payment_mode: receipt.payment_mode,
            note: receipt.note.clone(),
            image_url: receipt.image_url.clone(),
            created_at: receipt.created_at,
            uploader,
            tags,
        }
    }

    fn ordered<'a>(&'a self, order: ReceiptOrder) -> Vec<&'a StoredReceipt> {
        let mut receipts: Vec<&StoredReceipt> = self.receipts.iter().collect();
        receipts.sort_by_key(|s| (s.receipt.created_at, s.seq));
        if order == ReceiptOrder::NewestFirst {
            receipts.reverse();
        }
        receipts
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserWithRoles>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserWithRoles>, StoreError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserWithRoles>, StoreError> {
        Ok(self.lock().users.clone())
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        roles: &[Role],
    ) -> Result<UserWithRoles, StoreError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }
        let user = UserWithRoles {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
            roles: roles.to_vec(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        Ok(inner.users.len() < before)
    }

    async fn insert_receipt(&self, new: NewReceipt) -> Result<Receipt, StoreError> {
        Ok(self.seed_receipt(new, Utc::now()))
    }

    async fn receipt_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().receipts.iter().any(|s| s.receipt.id == id))
    }

    async fn receipt_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .receipts
            .iter()
            .find(|s| s.receipt.id == id)
            .map(|s| inner.record(s)))
    }

    async fn search_receipts(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ReceiptRecord>, StoreError> {
        let inner = self.lock();
        let needle = search.map(|s| s.to_lowercase());
        let records = inner
            .ordered(ReceiptOrder::NewestFirst)
            .into_iter()
            .map(|s| inner.record(s))
            .filter(|record| match &needle {
                None => true,
                Some(needle) => {
                    record.note.to_lowercase().contains(needle)
                        || record.category.to_lowercase().contains(needle)
                        || record
                            .tags
                            .iter()
                            .any(|t| t.name.to_lowercase().contains(needle))
                }
            })
            .collect();
        Ok(records)
    }

    async fn receipts_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        order: ReceiptOrder,
    ) -> Result<Vec<ReceiptRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .ordered(order)
            .into_iter()
            .filter(|s| s.receipt.created_at >= from && s.receipt.created_at < until)
            .map(|s| inner.record(s))
            .collect())
    }

    async fn receipts_with_tag(&self, name: &str) -> Result<Vec<ReceiptRecord>, StoreError> {
        let inner = self.lock();
        let tag_ids: HashSet<Uuid> = inner
            .tags
            .iter()
            .filter(|t| t.name == name)
            .map(|t| t.id)
            .collect();
        Ok(inner
            .ordered(ReceiptOrder::NewestFirst)
            .into_iter()
            .filter(|s| {
                tag_ids
                    .iter()
                    .any(|tag_id| inner.links.contains(&(s.receipt.id, *tag_id)))
            })
            .map(|s| inner.record(s))
            .collect())
    }

    async fn find_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError> {
        Ok(self.lock().tags.iter().find(|t| key.matches(t)).cloned())
    }

    async fn try_insert_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError> {
        let mut inner = self.lock();
        if inner.tags.iter().any(|t| key.matches(t)) {
            return Ok(None);
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: key.name().to_string(),
            month: key.month().map(str::to_string),
        };
        inner.tags.push(tag.clone());
        Ok(Some(tag))
    }

    async fn link_receipt_tag(&self, receipt_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().links.insert((receipt_id, tag_id)))
    }

    async fn dashboard_snapshot(&self, recent_limit: i64) -> Result<DashboardSnapshot, StoreError> {
        let inner = self.lock();

        let total_amount: Decimal = inner.receipts.iter().map(|s| s.receipt.amount).sum();
        let total_receipts = inner.receipts.len() as i64;

        let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
        for stored in &inner.receipts {
            *by_category
                .entry(stored.receipt.category.clone())
                .or_default() += stored.receipt.amount;
        }
        let categories = by_category
            .into_iter()
            .map(|(category, amount)| CategoryTotal { category, amount })
            .collect();

        let recent = inner
            .ordered(ReceiptOrder::NewestFirst)
            .into_iter()
            .take(recent_limit.max(0) as usize)
            .map(|s| {
                let record = inner.record(s);
                RecentReceipt {
                    id: record.id,
                    amount: record.amount,
                    category: record.category,
                    payment_mode: record.payment_mode,
                    note: record.note,
                    image_url: record.image_url,
                    created_at: record.created_at,
                    uploader: UploaderName {
                        name: record.uploader.name,
                    },
                }
            })
            .collect();

        Ok(DashboardSnapshot {
            total_amount,
            total_receipts,
            categories,
            recent,
        })
    }
}
