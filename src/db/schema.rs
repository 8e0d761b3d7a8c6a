use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Merchants (tenants - own payments and webhook endpoints)
        CREATE TABLE IF NOT EXISTS merchants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            api_key_hash TEXT NOT NULL UNIQUE,
            fee_percent REAL NOT NULL,
            fixed_fee INTEGER NOT NULL,
            livemode INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_merchants_api_key ON merchants(api_key_hash);

        -- Payments (append-only; rows are never deleted, only superseded
        -- by status changes)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            merchant_id TEXT NOT NULL REFERENCES merchants(id),
            order_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            currency TEXT NOT NULL,
            amount_refunded INTEGER NOT NULL DEFAULT 0
                CHECK (amount_refunded >= 0 AND amount_refunded <= amount),
            fee_amount INTEGER NOT NULL,
            net_amount INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN (
                'pending', 'processing', 'succeeded', 'failed',
                'cancelled', 'refunded', 'partially_refunded', 'expired'
            )),
            description TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            paid_at INTEGER,
            cancelled_at INTEGER,
            refunded_at INTEGER,
            expires_at INTEGER,
            UNIQUE(merchant_id, order_id)
        );
        CREATE INDEX IF NOT EXISTS idx_payments_merchant ON payments(merchant_id);
        CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(merchant_id, status);
        CREATE INDEX IF NOT EXISTS idx_payments_expiry
            ON payments(expires_at) WHERE status = 'pending' AND expires_at IS NOT NULL;

        -- Refunds (owned by exactly one payment)
        CREATE TABLE IF NOT EXISTS refunds (
            id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL REFERENCES payments(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL CHECK (amount > 0),
            reason TEXT,
            status TEXT NOT NULL CHECK (status IN (
                'pending', 'processing', 'succeeded', 'failed'
            )),
            processed_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_refunds_payment ON refunds(payment_id);

        -- Webhook endpoints (merchant subscriptions)
        CREATE TABLE IF NOT EXISTS webhook_endpoints (
            id TEXT PRIMARY KEY,
            merchant_id TEXT NOT NULL REFERENCES merchants(id),
            url TEXT NOT NULL,
            secret TEXT NOT NULL,
            events TEXT NOT NULL,  -- JSON array of event type strings
            is_active INTEGER NOT NULL DEFAULT 1,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_success_at INTEGER,
            last_failure_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_endpoints_merchant
            ON webhook_endpoints(merchant_id);

        -- Webhook attempts (append-only delivery audit trail)
        CREATE TABLE IF NOT EXISTS webhook_attempts (
            id TEXT PRIMARY KEY,
            endpoint_id TEXT NOT NULL REFERENCES webhook_endpoints(id) ON DELETE CASCADE,
            event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
            status_code INTEGER NOT NULL,
            success INTEGER NOT NULL,
            error TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(endpoint_id, event_id, attempt_number)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_attempts_endpoint
            ON webhook_attempts(endpoint_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_webhook_attempts_event
            ON webhook_attempts(endpoint_id, event_id);
        "#,
    )
}
