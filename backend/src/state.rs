use std::sync::Arc;

use loan_gateway::Gateway;
use tokio::sync::Mutex;

/// Shared application state. The single mutex around the gateway is the
/// serialization point for the whole consistency domain: every compound
/// operation runs to completion before the next one begins.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Mutex<Gateway>>,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(gateway: Gateway, jwt_secret: String) -> Self {
        Self {
            gateway: Arc::new(Mutex::new(gateway)),
            jwt_secret,
        }
    }
}
