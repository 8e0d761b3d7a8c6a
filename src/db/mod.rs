mod from_row;
pub mod queries;
mod schema;

pub use from_row::{query_all, query_one, FromRow};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::webhooks::{Dispatcher, EventSender};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Channel into the webhook dispatcher worker. Sends never block.
    pub events: EventSender,
    /// Shared dispatcher, used directly for manual redelivery.
    pub dispatcher: Dispatcher,
    pub base_url: String,
    /// Fee config applied to merchants created without an explicit one.
    pub default_fee_percent: f64,
    pub default_fixed_fee: i64,
}

/// Create a connection pool.
///
/// WAL mode plus a busy timeout lets concurrent writers on different pool
/// connections queue behind each other instead of failing immediately,
/// which the refund guard relies on.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
    });
    Pool::builder().max_size(10).build(manager)
}
