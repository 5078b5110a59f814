use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::access;
use crate::error::AppError;
use crate::middleware::{authorize, Bearer};
use crate::services::excel::{self, XLSX_MIME};
use crate::services::reports;
use crate::state::AppState;

pub async fn monthly(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(month): Path<String>,
) -> Result<Json<reports::MonthlyReport>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let report = reports::monthly_report(state.store.as_ref(), &month).await?;
    Ok(Json(report))
}

pub async fn yearly(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(year): Path<String>,
) -> Result<Json<reports::YearlyReport>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let report = reports::yearly_report(state.store.as_ref(), &year).await?;
    Ok(Json(report))
}

pub async fn event(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(name): Path<String>,
) -> Result<Json<reports::EventReport>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let report = reports::event_report(state.store.as_ref(), &name).await?;
    Ok(Json(report))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
) -> Result<Json<reports::DashboardStats>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let stats = reports::dashboard(state.store.as_ref()).await?;
    Ok(Json(stats))
}

pub async fn export_month(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(month): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let rows = reports::export_month_rows(state.store.as_ref(), &month).await?;
    spreadsheet_response(&month, &rows)
}

pub async fn export_year(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(year): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::REPORT_VIEW)?;
    let rows = reports::export_year_rows(state.store.as_ref(), &year).await?;
    spreadsheet_response(&year, &rows)
}

fn spreadsheet_response(
    value: &str,
    rows: &[crate::models::ReceiptRecord],
) -> Result<impl IntoResponse, AppError> {
    let bytes = excel::receipt_workbook(rows)
        .map_err(|err| AppError::Internal(format!("xlsx build failed: {err}")))?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=Report_{value}.xlsx"),
            ),
        ],
        bytes,
    ))
}
