//! Row-to-model decoding shared by every query in [`super::queries`].

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Decode a TEXT column holding one of our status/type enums. An
/// unrecognized value surfaces as a column-type error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a nullable JSON-array column into an optional string list.
///
/// Corrupt JSON is surfaced as an error rather than decoded as an empty list,
/// since an empty allow-list means "unrestricted".
fn parse_json_list(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<Vec<String>>> {
    match row.get::<_, Option<String>>(col)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
    }
}

/// Decodes one row into a model, with the column order fixed by the
/// matching `*_COLS` constant below.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Run a SELECT expected to match at most one row.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Run a SELECT and decode every row.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PRODUCT_COLS: &str =
    "id, name, price_cents, currency, is_order_bump, active, created_at";

pub const COUPON_COLS: &str = "id, code, discount_type, discount_value, usage_limit_global, usage_limit_per_user, current_usage_count, is_active, starts_at, expires_at, allowed_product_ids, allowed_emails, exclude_order_bumps, created_at, updated_at";

pub const RESERVATION_COLS: &str =
    "id, coupon_id, customer_email, status, created_at, expires_at";

pub const REDEMPTION_COLS: &str = "id, coupon_id, customer_email, discount_amount, created_at";

pub const CHECKOUT_SESSION_COLS: &str = "id, product_id, customer_email, amount_cents, discount_cents, coupon_id, reservation_id, provider_session_id, completed, created_at";

// ============ FromRow Implementations ============

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            price_cents: row.get(2)?,
            currency: row.get(3)?,
            is_order_bump: row.get::<_, i32>(4)? != 0,
            active: row.get::<_, i32>(5)? != 0,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Coupon {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Coupon {
            id: row.get(0)?,
            code: row.get(1)?,
            discount_type: parse_enum(row, 2, "discount_type")?,
            discount_value: row.get(3)?,
            usage_limit_global: row.get(4)?,
            usage_limit_per_user: row.get(5)?,
            current_usage_count: row.get(6)?,
            is_active: row.get::<_, i32>(7)? != 0,
            starts_at: row.get(8)?,
            expires_at: row.get(9)?,
            allowed_product_ids: parse_json_list(row, 10, "allowed_product_ids")?,
            allowed_emails: parse_json_list(row, 11, "allowed_emails")?,
            exclude_order_bumps: row.get::<_, i32>(12)? != 0,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for Reservation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Reservation {
            id: row.get(0)?,
            coupon_id: row.get(1)?,
            customer_email: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            created_at: row.get(4)?,
            expires_at: row.get(5)?,
        })
    }
}

impl FromRow for Redemption {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Redemption {
            id: row.get(0)?,
            coupon_id: row.get(1)?,
            customer_email: row.get(2)?,
            discount_amount: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for CheckoutSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CheckoutSession {
            id: row.get(0)?,
            product_id: row.get(1)?,
            customer_email: row.get(2)?,
            amount_cents: row.get(3)?,
            discount_cents: row.get(4)?,
            coupon_id: row.get(5)?,
            reservation_id: row.get(6)?,
            provider_session_id: row.get(7)?,
            completed: row.get::<_, i32>(8)? != 0,
            created_at: row.get(9)?,
        })
    }
}
