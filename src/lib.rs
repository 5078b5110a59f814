pub mod access;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        // Auth
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/change-password", post(handlers::auth::change_password))
        // Receipts
        .route(
            "/receipts",
            post(handlers::receipts::create_receipt).get(handlers::receipts::list_receipts),
        )
        .route("/receipts/:id", get(handlers::receipts::get_receipt))
        .route("/receipts/:id/tag", post(handlers::receipts::tag_receipt))
        // Reports
        .route("/reports/dashboard", get(handlers::reports::dashboard))
        .route("/reports/month/:month", get(handlers::reports::monthly))
        .route("/reports/year/:year", get(handlers::reports::yearly))
        .route(
            "/reports/export/month/:month",
            get(handlers::reports::export_month),
        )
        .route(
            "/reports/export/year/:year",
            get(handlers::reports::export_year),
        )
        .route("/reports/event/:name", get(handlers::reports::event))
        // User administration
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/users/:id", axum::routing::delete(handlers::users::delete_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(10 * 1024 * 1024)), // 10MB
        )
        .with_state(state)
}
