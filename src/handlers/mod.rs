pub mod auth;
pub mod receipts;
pub mod reports;
pub mod users;

use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Masjid Receipt System API is running" }))
}
