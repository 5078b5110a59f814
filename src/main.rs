use std::env;
use std::sync::Arc;

use dotenvy::dotenv;

use masjid_receipts::database::create_database_pool;
use masjid_receipts::middleware::JwtConfig;
use masjid_receipts::store::PgLedgerStore;
use masjid_receipts::{create_router, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let ttl_minutes = env::var("TOKEN_TTL_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let state = AppState::new(
        Arc::new(PgLedgerStore::new(db)),
        JwtConfig::new(jwt_secret, ttl_minutes),
    );

    let app = create_router(state);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    log::info!("receipt server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
