use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Products (catalog; order bumps are add-on line items)
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            currency TEXT NOT NULL DEFAULT 'usd',
            is_order_bump INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );

        -- Coupons (discount rules with usage limits)
        -- current_usage_count moves only inside redemption finalization;
        -- reservations never touch it.
        CREATE TABLE IF NOT EXISTS coupons (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,  -- canonical uppercase
            discount_type TEXT NOT NULL CHECK (discount_type IN ('percentage', 'fixed')),
            discount_value INTEGER NOT NULL CHECK (discount_value > 0),
            usage_limit_global INTEGER CHECK (usage_limit_global IS NULL OR usage_limit_global >= 1),
            usage_limit_per_user INTEGER CHECK (usage_limit_per_user IS NULL OR usage_limit_per_user >= 1),
            current_usage_count INTEGER NOT NULL DEFAULT 0 CHECK (current_usage_count >= 0),
            is_active INTEGER NOT NULL DEFAULT 1,
            starts_at INTEGER,
            expires_at INTEGER,
            allowed_product_ids TEXT,   -- JSON array, NULL or [] = unrestricted
            allowed_emails TEXT,        -- JSON array of lowercase emails, NULL or [] = unrestricted
            exclude_order_bumps INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_coupons_code ON coupons(code);

        -- Reservations (short-lived holds on coupon capacity)
        -- Explicit status column; expired rows are flipped, not inferred.
        CREATE TABLE IF NOT EXISTS coupon_reservations (
            id TEXT PRIMARY KEY,
            coupon_id TEXT NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,  -- normalized lowercase
            status TEXT NOT NULL CHECK (status IN ('held', 'consumed', 'expired')),
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        -- One live hold per (coupon, email)
        CREATE UNIQUE INDEX IF NOT EXISTS idx_reservations_live_unique
            ON coupon_reservations(coupon_id, customer_email) WHERE status = 'held';
        CREATE INDEX IF NOT EXISTS idx_reservations_coupon_status
            ON coupon_reservations(coupon_id, status);
        CREATE INDEX IF NOT EXISTS idx_reservations_sweep
            ON coupon_reservations(status, expires_at);

        -- Redemptions (append-only ledger of finalized coupon uses)
        CREATE TABLE IF NOT EXISTS coupon_redemptions (
            id TEXT PRIMARY KEY,
            coupon_id TEXT NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,
            discount_amount INTEGER NOT NULL CHECK (discount_amount >= 0),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_redemptions_coupon ON coupon_redemptions(coupon_id);
        CREATE INDEX IF NOT EXISTS idx_redemptions_coupon_email
            ON coupon_redemptions(coupon_id, customer_email);

        -- Checkout sessions (one row per initiated purchase; the payment
        -- webhook claims a session exactly once via completed 0 -> 1)
        CREATE TABLE IF NOT EXISTS checkout_sessions (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            customer_email TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            coupon_id TEXT REFERENCES coupons(id) ON DELETE SET NULL,
            reservation_id TEXT REFERENCES coupon_reservations(id) ON DELETE SET NULL,
            provider_session_id TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checkout_sessions_provider
            ON checkout_sessions(provider_session_id);
        "#,
    )?;
    Ok(())
}
