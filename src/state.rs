use std::sync::Arc;

use crate::middleware::JwtConfig;
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub jwt: JwtConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, jwt: JwtConfig) -> Self {
        Self { store, jwt }
    }
}
