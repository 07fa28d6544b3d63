mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::PaymentClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Client for the external payment-session API (also verifies webhooks)
    pub payments: PaymentClient,
    /// Base URL for callbacks (e.g., https://api.example.com)
    pub base_url: String,
    /// Where customers land after the payment provider redirects back
    pub success_page_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
