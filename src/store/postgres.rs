use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{
    CategoryTotal, DashboardSnapshot, LedgerStore, ReceiptOrder, StoreError,
};
use crate::database::Database;
use crate::models::{
    NewReceipt, PaymentMode, Receipt, ReceiptRecord, RecentReceipt, Role, Tag, TagKey, Uploader,
    UploaderName, UserWithRoles,
};

/// Postgres-backed ledger. All queries are runtime-bound so the crate builds
/// without a live database.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Database,
}

impl PgLedgerStore {
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ReceiptRow {
    id: Uuid,
    amount: Decimal,
    category: String,
    payment_mode: String,
    note: String,
    image_url: String,
    created_at: DateTime<Utc>,
    uploader_name: String,
    uploader_email: String,
}

#[derive(FromRow)]
struct TagRow {
    receipt_id: Uuid,
    id: Uuid,
    name: String,
    month: Option<String>,
}

const RECEIPT_SELECT: &str = r#"
    SELECT r.id, r.amount, r.category, r.payment_mode, r.note, r.image_url,
           r.created_at, u.name AS uploader_name, u.email AS uploader_email
    FROM receipts r
    JOIN users u ON r.uploaded_by = u.id
"#;

// READ COMMITTED re-snapshots per statement, which would let a concurrent
// commit land between the total and the recent-list reads. REPEATABLE READ
// pins every statement in the transaction to one snapshot.
const SNAPSHOT_TX_MODE: &str =
    "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

fn decode_mode(raw: &str) -> Result<PaymentMode, StoreError> {
    PaymentMode::from_str(raw)
        .map_err(|err| StoreError::Database(sqlx::Error::Decode(Box::new(err))))
}

/// Role names in the roles table are reference data; an unrecognized name is
/// skipped with a warning so it can never grant anything.
fn decode_roles(names: Vec<String>) -> Vec<Role> {
    names
        .into_iter()
        .filter_map(|name| match Role::from_str(&name) {
            Ok(role) => Some(role),
            Err(_) => {
                log::warn!("ignoring unknown role name in store: {name}");
                None
            }
        })
        .collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl PgLedgerStore {
    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur JOIN roles r ON ur.role_id = r.id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_roles(names))
    }

    fn user_from_row(row: UserRow, roles: Vec<Role>) -> UserWithRoles {
        UserWithRoles {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
            roles,
        }
    }

    /// Decorates fetched receipt rows with their tags in one follow-up query.
    async fn into_records(&self, rows: Vec<ReceiptRow>) -> Result<Vec<ReceiptRecord>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut tags_by_receipt: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        if !ids.is_empty() {
            let tag_rows = sqlx::query_as::<_, TagRow>(
                "SELECT rt.receipt_id, t.id, t.name, t.month \
                 FROM receipt_tags rt JOIN tags t ON rt.tag_id = t.id \
                 WHERE rt.receipt_id = ANY($1) ORDER BY t.name",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            for row in tag_rows {
                tags_by_receipt.entry(row.receipt_id).or_default().push(Tag {
                    id: row.id,
                    name: row.name,
                    month: row.month,
                });
            }
        }

        rows.into_iter()
            .map(|row| {
                Ok(ReceiptRecord {
                    id: row.id,
                    amount: row.amount,
                    category: row.category,
                    payment_mode: decode_mode(&row.payment_mode)?,
                    note: row.note,
                    image_url: row.image_url,
                    created_at: row.created_at,
                    uploader: Uploader {
                        name: row.uploader_name,
                        email: row.uploader_email,
                    },
                    tags: tags_by_receipt.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserWithRoles>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let roles = self.roles_for_user(row.id).await?;
                Ok(Some(Self::user_from_row(row, roles)))
            }
            None => Ok(None),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserWithRoles>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let roles = self.roles_for_user(row.id).await?;
                Ok(Some(Self::user_from_row(row, roles)))
            }
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> Result<Vec<UserWithRoles>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, created_at FROM users ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mappings = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT ur.user_id, r.name FROM user_roles ur JOIN roles r ON ur.role_id = r.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut roles_by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (user_id, name) in mappings {
            roles_by_user.entry(user_id).or_default().push(name);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let roles = decode_roles(roles_by_user.remove(&row.id).unwrap_or_default());
                Self::user_from_row(row, roles)
            })
            .collect())
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        roles: &[Role],
    ) -> Result<UserWithRoles, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, name, email, password_hash, created_at",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict
            } else {
                StoreError::Database(err)
            }
        })?;

        for role in roles {
            let result = sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, id FROM roles WHERE name = $2 \
                 ON CONFLICT DO NOTHING",
            )
            .bind(row.id)
            .bind(role.to_string())
            .execute(&mut *tx)
            .await?;
            // The returned user must describe what was persisted; a role
            // name absent from the roles table aborts the transaction
            // instead of being silently dropped from the assignment.
            if result.rows_affected() != 1 {
                log::error!("role {role} is missing from the roles table");
                return Err(StoreError::Database(sqlx::Error::RowNotFound));
            }
        }

        tx.commit().await?;
        Ok(Self::user_from_row(row, roles.to_vec()))
    }

    async fn update_user_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_receipt(&self, new: NewReceipt) -> Result<Receipt, StoreError> {
        let (id, created_at) = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            "INSERT INTO receipts (amount, category, payment_mode, note, image_url, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id, created_at",
        )
        .bind(new.amount)
        .bind(&new.category)
        .bind(new.payment_mode.to_string())
        .bind(&new.note)
        .bind(&new.image_url)
        .bind(new.uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(Receipt {
            id,
            amount: new.amount,
            category: new.category,
            payment_mode: new.payment_mode,
            note: new.note,
            image_url: new.image_url,
            uploaded_by: new.uploaded_by,
            created_at,
        })
    }

    async fn receipt_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM receipts WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn receipt_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, StoreError> {
        let sql = format!("{RECEIPT_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, ReceiptRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.into_records(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn search_receipts(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ReceiptRecord>, StoreError> {
        let sql = format!(
            "{RECEIPT_SELECT} \
             WHERE $1::text IS NULL \
                OR r.note ILIKE '%' || $1 || '%' \
                OR r.category ILIKE '%' || $1 || '%' \
                OR EXISTS (SELECT 1 FROM receipt_tags rt JOIN tags t ON rt.tag_id = t.id \
                           WHERE rt.receipt_id = r.id AND t.name ILIKE '%' || $1 || '%') \
             ORDER BY r.created_at DESC"
        );
        let rows = sqlx::query_as::<_, ReceiptRow>(&sql)
            .bind(search)
            .fetch_all(&self.pool)
            .await?;
        self.into_records(rows).await
    }

    async fn receipts_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        order: ReceiptOrder,
    ) -> Result<Vec<ReceiptRecord>, StoreError> {
        let direction = match order {
            ReceiptOrder::NewestFirst => "DESC",
            ReceiptOrder::OldestFirst => "ASC",
        };
        let sql = format!(
            "{RECEIPT_SELECT} \
             WHERE r.created_at >= $1 AND r.created_at < $2 \
             ORDER BY r.created_at {direction}"
        );
        let rows = sqlx::query_as::<_, ReceiptRow>(&sql)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;
        self.into_records(rows).await
    }

    async fn receipts_with_tag(&self, name: &str) -> Result<Vec<ReceiptRecord>, StoreError> {
        let sql = format!(
            "{RECEIPT_SELECT} \
             WHERE EXISTS (SELECT 1 FROM receipt_tags rt JOIN tags t ON rt.tag_id = t.id \
                           WHERE rt.receipt_id = r.id AND t.name = $1) \
             ORDER BY r.created_at DESC"
        );
        let rows = sqlx::query_as::<_, ReceiptRow>(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        self.into_records(rows).await
    }

    async fn find_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError> {
        let tag = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
            "SELECT id, name, month FROM tags \
             WHERE name = $1 AND COALESCE(month, '') = COALESCE($2, '')",
        )
        .bind(key.name())
        .bind(key.month())
        .fetch_optional(&self.pool)
        .await?;
        Ok(tag.map(|(id, name, month)| Tag { id, name, month }))
    }

    async fn try_insert_tag(&self, key: &TagKey) -> Result<Option<Tag>, StoreError> {
        // Conditional insert against the (name, COALESCE(month, '')) unique
        // index; RETURNING yields nothing when an identical key already won.
        let tag = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
            "INSERT INTO tags (name, month) VALUES ($1, $2) \
             ON CONFLICT (name, COALESCE(month, '')) DO NOTHING \
             RETURNING id, name, month",
        )
        .bind(key.name())
        .bind(key.month())
        .fetch_optional(&self.pool)
        .await?;
        Ok(tag.map(|(id, name, month)| Tag { id, name, month }))
    }

    async fn link_receipt_tag(&self, receipt_id: Uuid, tag_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO receipt_tags (receipt_id, tag_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(receipt_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn dashboard_snapshot(&self, recent_limit: i64) -> Result<DashboardSnapshot, StoreError> {
        // One snapshot so the totals, the category breakdown, and the recent
        // list describe the same ledger state.
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_TX_MODE).execute(&mut *tx).await?;

        let (total_amount, total_receipts) = sqlx::query_as::<_, (Decimal, i64)>(
            "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM receipts",
        )
        .fetch_one(&mut *tx)
        .await?;

        let categories = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT category, SUM(amount) FROM receipts GROUP BY category ORDER BY category",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(category, amount)| CategoryTotal { category, amount })
        .collect();

        #[derive(FromRow)]
        struct RecentRow {
            id: Uuid,
            amount: Decimal,
            category: String,
            payment_mode: String,
            note: String,
            image_url: String,
            created_at: DateTime<Utc>,
            uploader_name: String,
        }

        let recent_rows = sqlx::query_as::<_, RecentRow>(
            "SELECT r.id, r.amount, r.category, r.payment_mode, r.note, r.image_url, \
                    r.created_at, u.name AS uploader_name \
             FROM receipts r JOIN users u ON r.uploaded_by = u.id \
             ORDER BY r.created_at DESC LIMIT $1",
        )
        .bind(recent_limit)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let recent = recent_rows
            .into_iter()
            .map(|row| {
                Ok(RecentReceipt {
                    id: row.id,
                    amount: row.amount,
                    category: row.category,
                    payment_mode: decode_mode(&row.payment_mode)?,
                    note: row.note,
                    image_url: row.image_url,
                    created_at: row.created_at,
                    uploader: UploaderName {
                        name: row.uploader_name,
                    },
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(DashboardSnapshot {
            total_amount,
            total_receipts,
            categories,
            recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // READ COMMITTED would re-snapshot between the dashboard statements;
    // the mode the transaction requests must rule that out.
    #[test]
    fn dashboard_transaction_requests_a_single_read_snapshot() {
        assert!(SNAPSHOT_TX_MODE.contains("ISOLATION LEVEL REPEATABLE READ"));
        assert!(SNAPSHOT_TX_MODE.contains("READ ONLY"));
    }
}
