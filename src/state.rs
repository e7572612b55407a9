use mongodb::Database;
use std::sync::Arc;

use crate::services::payments::PaymentService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(db: Database, payments: Arc<PaymentService>) -> Self {
        AppState { db, payments }
    }
}
