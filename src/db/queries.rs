use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Value};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    CHECKOUT_SESSION_COLS, COUPON_COLS, PRODUCT_COLS, REDEMPTION_COLS, RESERVATION_COLS,
    query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Assembles an UPDATE from whichever optional fields a PATCH-style payload
/// actually carries, so partial coupon updates stay one statement.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Always writes the column: `Some(v)` stores v, `None` stores NULL.
    /// This is how a payload clears a usage limit or expiry date.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    /// Runs the UPDATE with a RETURNING clause and decodes the fresh row.
    /// `None` when the row does not exist or the payload set nothing.
    fn execute_returning<T: super::from_row::FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    let currency = input.currency.clone().unwrap_or_else(|| "usd".to_string());

    conn.execute(
        "INSERT INTO products (id, name, price_cents, currency, is_order_bump, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![
            &id,
            input.name.trim(),
            input.price_cents,
            &currency,
            input.is_order_bump as i32,
            now
        ],
    )?;

    Ok(Product {
        id,
        name: input.name.trim().to_string(),
        price_cents: input.price_cents,
        currency,
        is_order_bump: input.is_order_bump,
        active: true,
        created_at: now,
    })
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

/// Batch fetch products by IDs. Returns all found products (missing IDs are silently skipped).
pub fn get_products_by_ids(conn: &Connection, ids: &[&str]) -> Result<Vec<Product>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {} FROM products WHERE id IN ({})",
        PRODUCT_COLS,
        placeholders.join(", ")
    );
    let params: Vec<&dyn rusqlite::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    query_all(conn, &sql, &params)
}

pub fn list_products_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Product>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;

    let products = query_all(
        conn,
        &format!(
            "SELECT {} FROM products ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            PRODUCT_COLS
        ),
        params![limit, offset],
    )?;

    Ok((products, total))
}

// ============ Coupons ============

pub fn create_coupon(conn: &Connection, input: &CreateCoupon) -> Result<Coupon> {
    let id = gen_id();
    let now = now();
    let code = input.canonical_code();
    let allowed_products_json = input
        .allowed_product_ids
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    // Allow-list emails are matched lowercase, store them that way
    let allowed_emails = input
        .allowed_emails
        .as_ref()
        .map(|emails| emails.iter().map(|e| e.trim().to_lowercase()).collect::<Vec<_>>());
    let allowed_emails_json = allowed_emails.as_ref().map(serde_json::to_string).transpose()?;
    let usage_count = input.current_usage_count.unwrap_or(0);

    conn.execute(
        "INSERT INTO coupons (id, code, discount_type, discount_value, usage_limit_global, usage_limit_per_user, current_usage_count, is_active, starts_at, expires_at, allowed_product_ids, allowed_emails, exclude_order_bumps, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            &id,
            &code,
            input.discount_type.as_str(),
            input.discount_value,
            input.usage_limit_global,
            input.usage_limit_per_user,
            usage_count,
            input.is_active as i32,
            input.starts_at,
            input.expires_at,
            &allowed_products_json,
            &allowed_emails_json,
            input.exclude_order_bumps as i32,
            now,
            now
        ],
    )?;

    Ok(Coupon {
        id,
        code,
        discount_type: input.discount_type,
        discount_value: input.discount_value,
        usage_limit_global: input.usage_limit_global,
        usage_limit_per_user: input.usage_limit_per_user,
        current_usage_count: usage_count,
        is_active: input.is_active,
        starts_at: input.starts_at,
        expires_at: input.expires_at,
        allowed_product_ids: input.allowed_product_ids.clone(),
        allowed_emails,
        exclude_order_bumps: input.exclude_order_bumps,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_coupon_by_id(conn: &Connection, id: &str) -> Result<Option<Coupon>> {
    query_one(
        conn,
        &format!("SELECT {} FROM coupons WHERE id = ?1", COUPON_COLS),
        &[&id],
    )
}

/// Look up a coupon by code. Input is canonicalized (trimmed, uppercased)
/// before the lookup, so callers can pass raw user input.
pub fn get_coupon_by_code(conn: &Connection, code: &str) -> Result<Option<Coupon>> {
    let canonical = code.trim().to_uppercase();
    query_one(
        conn,
        &format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLS),
        &[&canonical],
    )
}

pub fn list_coupons_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Coupon>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM coupons", [], |row| row.get(0))?;

    let coupons = query_all(
        conn,
        &format!(
            "SELECT {} FROM coupons ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            COUPON_COLS
        ),
        params![limit, offset],
    )?;

    Ok((coupons, total))
}

/// Update a coupon. Returns the updated coupon, or None if not found.
pub fn update_coupon(conn: &Connection, id: &str, input: &UpdateCoupon) -> Result<Option<Coupon>> {
    let mut builder = UpdateBuilder::new("coupons", id)
        .with_updated_at()
        .set_opt(
            "discount_type",
            input.discount_type.map(|t| t.as_str().to_string()),
        )
        .set_opt("discount_value", input.discount_value)
        .set_opt("is_active", input.is_active.map(|b| b as i32))
        .set_opt("exclude_order_bumps", input.exclude_order_bumps.map(|b| b as i32));

    if let Some(ref limit) = input.usage_limit_global {
        builder = builder.set_nullable("usage_limit_global", *limit);
    }
    if let Some(ref limit) = input.usage_limit_per_user {
        builder = builder.set_nullable("usage_limit_per_user", *limit);
    }
    if let Some(ref starts_at) = input.starts_at {
        builder = builder.set_nullable("starts_at", *starts_at);
    }
    if let Some(ref expires_at) = input.expires_at {
        builder = builder.set_nullable("expires_at", *expires_at);
    }
    if let Some(ref ids) = input.allowed_product_ids {
        let json = ids.as_ref().map(serde_json::to_string).transpose()?;
        builder = builder.set_nullable("allowed_product_ids", json);
    }
    if let Some(ref emails) = input.allowed_emails {
        let lowered = emails.as_ref().map(|list| {
            list.iter()
                .map(|e| e.trim().to_lowercase())
                .collect::<Vec<_>>()
        });
        let json = lowered.as_ref().map(serde_json::to_string).transpose()?;
        builder = builder.set_nullable("allowed_emails", json);
    }

    builder.execute_returning(conn, COUPON_COLS)
}

/// Hard-delete a coupon together with its reservations and redemption ledger.
/// Checkout sessions keep their row but lose the coupon/reservation references.
pub fn delete_coupon_cascade(conn: &mut Connection, id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE checkout_sessions SET coupon_id = NULL, reservation_id = NULL WHERE coupon_id = ?1",
        params![id],
    )?;
    tx.execute(
        "DELETE FROM coupon_reservations WHERE coupon_id = ?1",
        params![id],
    )?;
    tx.execute(
        "DELETE FROM coupon_redemptions WHERE coupon_id = ?1",
        params![id],
    )?;
    let deleted = tx.execute("DELETE FROM coupons WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

pub fn increment_coupon_usage(conn: &Connection, coupon_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE coupons SET current_usage_count = current_usage_count + 1, updated_at = ?1 WHERE id = ?2",
        params![now(), coupon_id],
    )?;
    Ok(())
}

// ============ Reservations ============

pub fn get_reservation_by_id(conn: &Connection, id: &str) -> Result<Option<Reservation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM coupon_reservations WHERE id = ?1",
            RESERVATION_COLS
        ),
        &[&id],
    )
}

/// The caller's live hold on a coupon, if any. Rows past their expiry are
/// not returned even if a sweep has not flipped them yet.
pub fn get_live_reservation(
    conn: &Connection,
    coupon_id: &str,
    email: &str,
    now: i64,
) -> Result<Option<Reservation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM coupon_reservations
             WHERE coupon_id = ?1 AND customer_email = ?2 AND status = 'held' AND expires_at > ?3",
            RESERVATION_COLS
        ),
        params![coupon_id, email, now],
    )
}

/// Count live holds on a coupon, optionally excluding one customer's own hold
/// so a repeat verify is not double-counted against the global limit.
pub fn count_live_reservations_excluding(
    conn: &Connection,
    coupon_id: &str,
    exclude_email: Option<&str>,
    now: i64,
) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM coupon_reservations
         WHERE coupon_id = ?1 AND status = 'held' AND expires_at > ?2
           AND (?3 IS NULL OR customer_email <> ?3)",
        params![coupon_id, now, exclude_email],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn create_reservation(
    conn: &Connection,
    coupon_id: &str,
    email: &str,
    expires_at: i64,
) -> Result<Reservation> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO coupon_reservations (id, coupon_id, customer_email, status, created_at, expires_at)
         VALUES (?1, ?2, ?3, 'held', ?4, ?5)",
        params![&id, coupon_id, email, now, expires_at],
    )?;

    Ok(Reservation {
        id,
        coupon_id: coupon_id.to_string(),
        customer_email: email.to_string(),
        status: ReservationStatus::Held,
        created_at: now,
        expires_at,
    })
}

/// Flip a stale held row for this (coupon, email) to expired so the partial
/// unique index does not block a fresh hold.
pub fn expire_stale_reservation_for_pair(
    conn: &Connection,
    coupon_id: &str,
    email: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE coupon_reservations SET status = 'expired'
         WHERE coupon_id = ?1 AND customer_email = ?2 AND status = 'held' AND expires_at <= ?3",
        params![coupon_id, email, now],
    )?;
    Ok(())
}

/// Atomically consume a live hold, returning whether this call won the flip.
///
/// Compare-and-swap on status so a double-finalize can never consume the same
/// reservation twice.
pub fn try_consume_reservation(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE coupon_reservations SET status = 'consumed'
         WHERE id = ?1 AND status = 'held' AND expires_at > ?2",
        params![id, now],
    )?;
    Ok(affected > 0)
}

/// Mark every stale held row expired. Returns the number of rows reclaimed.
pub fn expire_stale_reservations(conn: &Connection) -> Result<usize> {
    let reclaimed = conn.execute(
        "UPDATE coupon_reservations SET status = 'expired'
         WHERE status = 'held' AND expires_at <= ?1",
        params![now()],
    )?;
    Ok(reclaimed)
}

/// Purge terminal reservation rows beyond the retention period.
/// Returns the number of deleted records.
pub fn purge_dead_reservations(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM coupon_reservations
         WHERE status IN ('expired', 'consumed') AND created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

pub fn count_reservations_for_coupon(conn: &Connection, coupon_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM coupon_reservations WHERE coupon_id = ?1",
        params![coupon_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Redemptions ============

pub fn create_redemption(
    conn: &Connection,
    coupon_id: &str,
    email: &str,
    discount_amount: i64,
) -> Result<Redemption> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO coupon_redemptions (id, coupon_id, customer_email, discount_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, coupon_id, email, discount_amount, now],
    )?;

    Ok(Redemption {
        id,
        coupon_id: coupon_id.to_string(),
        customer_email: email.to_string(),
        discount_amount,
        created_at: now,
    })
}

pub fn count_redemptions_for_coupon(conn: &Connection, coupon_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1",
        params![coupon_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_redemptions_for_pair(
    conn: &Connection,
    coupon_id: &str,
    email: &str,
) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1 AND customer_email = ?2",
        params![coupon_id, email],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_redemptions_for_coupon_paginated(
    conn: &Connection,
    coupon_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Redemption>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1",
        params![coupon_id],
        |row| row.get(0),
    )?;

    let redemptions = query_all(
        conn,
        &format!(
            "SELECT {} FROM coupon_redemptions WHERE coupon_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            REDEMPTION_COLS
        ),
        params![coupon_id, limit, offset],
    )?;

    Ok((redemptions, total))
}

// ============ Checkout Sessions ============

pub fn create_checkout_session(
    conn: &Connection,
    input: &NewCheckoutSession,
) -> Result<CheckoutSession> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO checkout_sessions (id, product_id, customer_email, amount_cents, discount_cents, coupon_id, reservation_id, completed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            &id,
            input.product_id,
            input.customer_email,
            input.amount_cents,
            input.discount_cents,
            input.coupon_id,
            input.reservation_id,
            now
        ],
    )?;

    Ok(CheckoutSession {
        id,
        product_id: input.product_id.to_string(),
        customer_email: input.customer_email.to_string(),
        amount_cents: input.amount_cents,
        discount_cents: input.discount_cents,
        coupon_id: input.coupon_id.map(String::from),
        reservation_id: input.reservation_id.map(String::from),
        provider_session_id: None,
        completed: false,
        created_at: now,
    })
}

pub fn get_checkout_session(conn: &Connection, id: &str) -> Result<Option<CheckoutSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_sessions WHERE id = ?1",
            CHECKOUT_SESSION_COLS
        ),
        &[&id],
    )
}

/// Record the provider's session id once the hosted session exists.
pub fn set_checkout_session_provider(
    conn: &Connection,
    session_id: &str,
    provider_session_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE checkout_sessions SET provider_session_id = ?1 WHERE id = ?2",
        params![provider_session_id, session_id],
    )?;
    Ok(())
}

/// Atomically flip a checkout session to completed.
///
/// The conditional UPDATE is the idempotency gate for webhook deliveries:
/// `Ok(true)` means this caller won the claim and owns finalization,
/// `Ok(false)` means another delivery already completed the session.
pub fn try_claim_checkout_session(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET completed = 1 WHERE id = ?1 AND completed = 0",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Delete abandoned checkout sessions older than the retention window.
/// Completed sessions are kept: they are the purchase record the webhook
/// and callback answer from.
pub fn purge_old_checkout_sessions(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM checkout_sessions WHERE completed = 0 AND created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
