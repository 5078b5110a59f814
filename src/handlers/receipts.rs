use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

use crate::access;
use crate::error::AppError;
use crate::middleware::{authorize, Bearer};
use crate::models::{
    CreateReceipt, NewReceipt, PaymentMode, Receipt, ReceiptRecord, TagKey, TagReceipt,
    DEFAULT_CATEGORY,
};
use crate::services::{reports, tagging};
use crate::state::AppState;

/// Accepts the amount as either a JSON number or a numeric string, the way
/// form-based clients have always sent it.
fn parse_amount(raw: Option<&Value>) -> Result<Decimal, AppError> {
    let parsed = match raw {
        Some(Value::Number(n)) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .ok()
                .or_else(|| Decimal::from_scientific(&text).ok())
        }
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    match parsed {
        Some(amount) if amount >= Decimal::ZERO => Ok(amount),
        _ => Err(AppError::InvalidArgument(
            "Invalid amount format".to_string(),
        )),
    }
}

fn parse_mode(raw: Option<&str>) -> Result<PaymentMode, AppError> {
    match raw.filter(|s| !s.trim().is_empty()) {
        None => Ok(PaymentMode::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::InvalidArgument(format!("Invalid payment mode: {raw}"))),
    }
}

pub async fn create_receipt(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Json(body): Json<CreateReceipt>,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let claims = authorize(bearer.as_deref(), &state.jwt, access::RECEIPT_UPLOAD)?;

    // The image itself lives in external storage; the ledger only keeps the
    // reference, but a receipt without one is not a receipt.
    let image_url = body
        .image_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| AppError::InvalidArgument("Receipt image is required".to_string()))?;
    let amount = parse_amount(body.amount.as_ref())?;
    let payment_mode = parse_mode(body.payment_mode.as_deref())?;

    let receipt = state
        .store
        .insert_receipt(NewReceipt {
            amount,
            category: body
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            payment_mode,
            note: body.note.unwrap_or_default(),
            image_url,
            uploaded_by: claims.sub,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
}

pub async fn list_receipts(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReceiptRecord>>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::RECEIPT_VIEW)?;
    let search = params.search.as_deref().filter(|s| !s.trim().is_empty());
    let receipts = state.store.search_receipts(search).await?;
    Ok(Json(receipts))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(id): Path<Uuid>,
) -> Result<Json<ReceiptRecord>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::RECEIPT_VIEW)?;
    let receipt = state
        .store
        .receipt_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt not found".to_string()))?;
    Ok(Json(receipt))
}

pub async fn tag_receipt(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(id): Path<Uuid>,
    Json(body): Json<TagReceipt>,
) -> Result<Json<Value>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::RECEIPT_TAGGING)?;

    let name = body
        .tag_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::InvalidArgument("Tag name is required".to_string()))?;
    if let Some(month) = body.month.as_deref().filter(|m| !m.trim().is_empty()) {
        reports::parse_month(month)?;
    }

    let key = TagKey::new(name, body.month);
    let applied = tagging::apply_tag(state.store.as_ref(), id, &key).await?;

    Ok(Json(json!({
        "message": "Receipt tagged successfully",
        "tag": applied.tag,
    })))
}
