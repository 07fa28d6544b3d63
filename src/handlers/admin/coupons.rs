use axum::extract::State;

use crate::coupons::cleanup_expired_reservations;
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{Coupon, CreateCoupon, Redemption, UpdateCoupon};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn create_coupon(
    State(state): State<AppState>,
    Json(input): Json<CreateCoupon>,
) -> Result<Json<Coupon>> {
    input.validate()?;

    let conn = state.db.get()?;
    if queries::get_coupon_by_code(&conn, &input.code)?.is_some() {
        return Err(AppError::Conflict(msg::COUPON_CODE_TAKEN.into()));
    }

    let coupon = queries::create_coupon(&conn, &input)?;

    tracing::info!("Created coupon {} ({})", coupon.code, coupon.id);
    Ok(Json(coupon))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Coupon>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (coupons, total) = queries::list_coupons_paginated(&conn, limit, offset)?;
    Ok(Json(Paginated::new(coupons, total, limit, offset)))
}

pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Coupon>> {
    let conn = state.db.get()?;
    let coupon = queries::get_coupon_by_id(&conn, &id)?.or_not_found(msg::COUPON_NOT_FOUND)?;
    Ok(Json(coupon))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateCoupon>,
) -> Result<Json<Coupon>> {
    input.validate()?;

    let conn = state.db.get()?;
    let coupon =
        queries::update_coupon(&conn, &id, &input)?.or_not_found(msg::COUPON_NOT_FOUND)?;

    tracing::info!("Updated coupon {} ({})", coupon.code, coupon.id);
    Ok(Json(coupon))
}

/// Remove a coupon and, with it, every reservation and ledger row it owns.
/// This is the one path that deletes redemptions.
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    let deleted = queries::delete_coupon_cascade(&mut conn, &id)?;
    if !deleted {
        return Err(AppError::NotFound(msg::COUPON_NOT_FOUND.into()));
    }

    tracing::info!("Deleted coupon {} with its reservations and ledger", id);
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn list_coupon_redemptions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Redemption>>> {
    let conn = state.db.get()?;
    queries::get_coupon_by_id(&conn, &id)?.or_not_found(msg::COUPON_NOT_FOUND)?;

    let limit = pagination.limit();
    let offset = pagination.offset();
    let (redemptions, total) =
        queries::list_redemptions_for_coupon_paginated(&conn, &id, limit, offset)?;
    Ok(Json(Paginated::new(redemptions, total, limit, offset)))
}

/// Manual trigger for the reservation sweep; the background task does the
/// same thing on a timer.
pub async fn cleanup_reservations(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let reclaimed = cleanup_expired_reservations(&conn)?;

    if reclaimed > 0 {
        tracing::info!("Admin cleanup reclaimed {} expired reservations", reclaimed);
    }
    Ok(Json(serde_json::json!({ "reclaimed": reclaimed })))
}
