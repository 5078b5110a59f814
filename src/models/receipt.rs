use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::Tag;

pub const DEFAULT_CATEGORY: &str = "General";

/// Payment modes are case-normalized to these canonical forms on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Cash,
    Card,
    Upi,
    BankTransfer,
}

impl Default for PaymentMode {
    fn default() -> Self {
        PaymentMode::Cash
    }
}

#[derive(Debug, Error)]
#[error("unknown payment mode: {0}")]
pub struct UnknownPaymentMode(pub String);

impl FromStr for PaymentMode {
    type Err = UnknownPaymentMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CASH" => Ok(PaymentMode::Cash),
            "CARD" => Ok(PaymentMode::Card),
            "UPI" => Ok(PaymentMode::Upi),
            "BANK_TRANSFER" => Ok(PaymentMode::BankTransfer),
            _ => Err(UnknownPaymentMode(s.to_string())),
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMode::Cash => "CASH",
            PaymentMode::Card => "CARD",
            PaymentMode::Upi => "UPI",
            PaymentMode::BankTransfer => "BANK_TRANSFER",
        };
        f.write_str(name)
    }
}

/// A receipt as stored in the ledger. Immutable after creation except for
/// tag associations.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub category: String,
    pub payment_mode: PaymentMode,
    pub note: String,
    pub image_url: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the store assigns id and creation timestamp.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub amount: Decimal,
    pub category: String,
    pub payment_mode: PaymentMode,
    pub note: String,
    pub image_url: String,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Uploader {
    pub name: String,
    pub email: String,
}

/// A receipt decorated with its uploader and tags, as returned by listing
/// and report queries.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptRecord {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub category: String,
    pub payment_mode: PaymentMode,
    pub note: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub uploader: Uploader,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploaderName {
    pub name: String,
}

/// Dashboard "recent activity" entry; carries the uploader name only.
#[derive(Debug, Clone, Serialize)]
pub struct RecentReceipt {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub category: String,
    pub payment_mode: PaymentMode,
    pub note: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub uploader: UploaderName,
}

#[derive(Debug, Deserialize)]
pub struct CreateReceipt {
    pub amount: Option<serde_json::Value>,
    pub category: Option<String>,
    pub payment_mode: Option<String>,
    pub note: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagReceipt {
    #[serde(rename = "tagName")]
    pub tag_name: Option<String>,
    pub month: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_mode_is_case_normalized() {
        assert_eq!("cash".parse::<PaymentMode>().unwrap(), PaymentMode::Cash);
        assert_eq!("Card".parse::<PaymentMode>().unwrap(), PaymentMode::Card);
        assert_eq!(
            "bank_transfer".parse::<PaymentMode>().unwrap(),
            PaymentMode::BankTransfer
        );
        assert!("WIRE".parse::<PaymentMode>().is_err());
    }

    #[test]
    fn amounts_serialize_as_exact_json_numbers() {
        let receipt = Receipt {
            id: Uuid::new_v4(),
            amount: "150.10".parse().unwrap(),
            category: DEFAULT_CATEGORY.into(),
            payment_mode: PaymentMode::Cash,
            note: String::new(),
            image_url: "uploads/r.jpg".into(),
            uploaded_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["amount"].to_string(), "150.10");
        assert_eq!(value["payment_mode"], "CASH");
    }
}
