use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{ReceiptRecord, RecentReceipt};
use crate::store::{LedgerStore, ReceiptOrder};

pub const INVALID_MONTH: &str = "Invalid month format. Use YYYY-MM";
pub const INVALID_YEAR: &str = "Invalid year format. Use YYYY";

/// How many receipts the dashboard's recent-activity strip shows.
const RECENT_LIMIT: i64 = 5;

#[derive(Debug, Serialize)]
pub struct MonthlyReport {
    pub month: String,
    #[serde(rename = "totalAmount", with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub count: usize,
    pub receipts: Vec<ReceiptRecord>,
}

#[derive(Debug, Serialize)]
pub struct YearlyReport {
    pub year: String,
    #[serde(rename = "totalAmount", with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub count: usize,
    pub receipts: Vec<ReceiptRecord>,
}

#[derive(Debug, Serialize)]
pub struct EventReport {
    pub event: String,
    #[serde(rename = "totalAmount", with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub count: usize,
    pub receipts: Vec<ReceiptRecord>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(rename = "totalAmount", with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    #[serde(rename = "totalReceipts")]
    pub total_receipts: i64,
    #[serde(rename = "categoryCounts")]
    pub category_counts: Vec<CategoryCount>,
    #[serde(rename = "recentReceipts")]
    pub recent_receipts: Vec<RecentReceipt>,
}

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub category: String,
    #[serde(rename = "_sum")]
    pub sum: CategorySum,
}

#[derive(Debug, Serialize)]
pub struct CategorySum {
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
}

/// Strict `YYYY-MM` with month 01-12. Anything looser ("2023-1", trailing
/// garbage) is rejected.
pub fn parse_month(raw: &str) -> Result<(i32, u32), AppError> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit);
    if !well_formed {
        return Err(AppError::InvalidArgument(INVALID_MONTH.to_string()));
    }

    let year: i32 = raw[..4]
        .parse()
        .map_err(|_| AppError::InvalidArgument(INVALID_MONTH.to_string()))?;
    let month: u32 = raw[5..]
        .parse()
        .map_err(|_| AppError::InvalidArgument(INVALID_MONTH.to_string()))?;
    if !(1..=12).contains(&month) {
        return Err(AppError::InvalidArgument(INVALID_MONTH.to_string()));
    }
    Ok((year, month))
}

/// Strict 4-digit year.
pub fn parse_year(raw: &str) -> Result<i32, AppError> {
    let bytes = raw.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(AppError::InvalidArgument(INVALID_YEAR.to_string()));
    }
    raw.parse()
        .map_err(|_| AppError::InvalidArgument(INVALID_YEAR.to_string()))
}

fn start_of(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Some(
        NaiveDate::from_ymd_opt(year, month, 1)?
            .and_hms_opt(0, 0, 0)?
            .and_utc(),
    )
}

/// Half-open UTC window `[first of month, first of next month)`. Contains
/// both the month's first instant and its last millisecond.
pub fn month_window(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start_of(year, month)?;
    let until = if month == 12 {
        start_of(year + 1, 1)?
    } else {
        start_of(year, month + 1)?
    };
    Some((from, until))
}

pub fn year_window(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    Some((start_of(year, 1)?, start_of(year + 1, 1)?))
}

fn sum_amounts(receipts: &[ReceiptRecord]) -> Decimal {
    receipts.iter().map(|r| r.amount).sum()
}

/// Total, count, and list all derive from the one fetched result set, so a
/// concurrent insert can never make them disagree within a single report.
pub async fn monthly_report(
    store: &dyn LedgerStore,
    raw_month: &str,
) -> Result<MonthlyReport, AppError> {
    let (year, month) = parse_month(raw_month)?;
    let (from, until) = month_window(year, month)
        .ok_or_else(|| AppError::InvalidArgument(INVALID_MONTH.to_string()))?;

    let receipts = store
        .receipts_in_window(from, until, ReceiptOrder::NewestFirst)
        .await?;
    Ok(MonthlyReport {
        month: raw_month.to_string(),
        total_amount: sum_amounts(&receipts),
        count: receipts.len(),
        receipts,
    })
}

pub async fn yearly_report(
    store: &dyn LedgerStore,
    raw_year: &str,
) -> Result<YearlyReport, AppError> {
    let year = parse_year(raw_year)?;
    let (from, until) =
        year_window(year).ok_or_else(|| AppError::InvalidArgument(INVALID_YEAR.to_string()))?;

    let receipts = store
        .receipts_in_window(from, until, ReceiptOrder::NewestFirst)
        .await?;
    Ok(YearlyReport {
        year: raw_year.to_string(),
        total_amount: sum_amounts(&receipts),
        count: receipts.len(),
        receipts,
    })
}

/// Tag-windowed rather than time-windowed: every receipt carrying a tag of
/// this name, whatever its month scope. An unknown name is an empty report,
/// not an error.
pub async fn event_report(store: &dyn LedgerStore, name: &str) -> Result<EventReport, AppError> {
    let receipts = store.receipts_with_tag(name).await?;
    Ok(EventReport {
        event: name.to_string(),
        total_amount: sum_amounts(&receipts),
        count: receipts.len(),
        receipts,
    })
}

pub async fn dashboard(store: &dyn LedgerStore) -> Result<DashboardStats, AppError> {
    let snapshot = store.dashboard_snapshot(RECENT_LIMIT).await?;
    Ok(DashboardStats {
        total_amount: snapshot.total_amount,
        total_receipts: snapshot.total_receipts,
        category_counts: snapshot
            .categories
            .into_iter()
            .map(|c| CategoryCount {
                category: c.category,
                sum: CategorySum { amount: c.amount },
            })
            .collect(),
        recent_receipts: snapshot.recent,
    })
}

/// Rows for the spreadsheet export: same window, oldest-first so the sheet
/// reads like a running ledger.
pub async fn export_month_rows(
    store: &dyn LedgerStore,
    raw_month: &str,
) -> Result<Vec<ReceiptRecord>, AppError> {
    let (year, month) = parse_month(raw_month)?;
    let (from, until) = month_window(year, month)
        .ok_or_else(|| AppError::InvalidArgument(INVALID_MONTH.to_string()))?;
    Ok(store
        .receipts_in_window(from, until, ReceiptOrder::OldestFirst)
        .await?)
}

pub async fn export_year_rows(
    store: &dyn LedgerStore,
    raw_year: &str,
) -> Result<Vec<ReceiptRecord>, AppError> {
    let year = parse_year(raw_year)?;
    let (from, until) =
        year_window(year).ok_or_else(|| AppError::InvalidArgument(INVALID_YEAR.to_string()))?;
    Ok(store
        .receipts_in_window(from, until, ReceiptOrder::OldestFirst)
        .await?)
}
