#![allow(dead_code)]

use tempfile::TempDir;

use paylane::db::{create_pool, init_db, queries, DbPool};
use paylane::models::{CreateMerchant, CreatePayment, Merchant, Payment};
use paylane::webhooks::EventSender;

/// A file-backed database in a temp dir, so multiple pool connections see
/// the same data. The TempDir must stay alive for the pool's lifetime.
pub fn test_db() -> (TempDir, DbPool) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("paylane-test.db");
    let pool = create_pool(path.to_str().unwrap()).expect("failed to create pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    (dir, pool)
}

pub fn create_test_merchant(conn: &rusqlite::Connection) -> Merchant {
    let input = CreateMerchant {
        name: "Test Merchant".to_string(),
        fee_percent: Some(2.9),
        fixed_fee: Some(30),
        livemode: false,
    };
    let api_key = queries::generate_api_key();
    queries::create_merchant(conn, &input, &api_key, 2.9, 30).unwrap()
}

pub fn create_test_payment(
    conn: &rusqlite::Connection,
    merchant: &Merchant,
    order_id: &str,
    amount: i64,
) -> Payment {
    let input = CreatePayment {
        order_id: order_id.to_string(),
        amount,
        currency: "usd".to_string(),
        description: None,
        expires_at: None,
    };
    paylane::ledger::create_payment(conn, merchant, &input, &EventSender::disconnected()).unwrap()
}
