use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Tag, TagKey};
use crate::store::{LedgerStore, StoreError};

/// Outcome of a tag application. `newly_linked` is false for the designed
/// no-op case of re-tagging an already-tagged receipt.
#[derive(Debug)]
pub struct AppliedTag {
    pub tag: Tag,
    pub newly_linked: bool,
}

/// Idempotently applies a tag to a receipt: resolve-or-create the tag by its
/// (name, month) identity, then attach it if not already attached. Safe to
/// retry; the only multi-step mutation is create-then-link and both steps
/// are conditional.
pub async fn apply_tag(
    store: &dyn LedgerStore,
    receipt_id: Uuid,
    key: &TagKey,
) -> Result<AppliedTag, AppError> {
    if !store.receipt_exists(receipt_id).await? {
        return Err(AppError::NotFound("Receipt not found".to_string()));
    }

    let tag = resolve_tag(store, key).await?;
    let newly_linked = store.link_receipt_tag(receipt_id, tag.id).await?;
    Ok(AppliedTag { tag, newly_linked })
}

/// Optimistic resolve-or-create. Concurrent first-use of the same key races
/// on the store's unique constraint; the loser re-reads once and uses the
/// winner's row. No lock is ever taken, so report reads stay unblocked.
async fn resolve_tag(store: &dyn LedgerStore, key: &TagKey) -> Result<Tag, AppError> {
    if let Some(tag) = store.find_tag(key).await? {
        return Ok(tag);
    }

    match store.try_insert_tag(key).await {
        Ok(Some(tag)) => return Ok(tag),
        // Lost the race; the winner's row is there to re-read.
        Ok(None) | Err(StoreError::Conflict) => {}
        Err(err) => return Err(err.into()),
    }

    store.find_tag(key).await?.ok_or_else(|| {
        AppError::Internal(format!(
            "tag {:?} vanished between conflict and re-read",
            key.name()
        ))
    })
}
