mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{FlowConfig, MercadoPagoConfig};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for webhook confirmation callbacks.
    pub base_url: String,
    /// Storefront URL customers return to after checkout.
    pub store_url: String,
    pub currency: String,
    pub shipping_flat: i64,
    pub admin_api_key: Option<String>,
    pub mercadopago: MercadoPagoConfig,
    pub flow: FlowConfig,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
