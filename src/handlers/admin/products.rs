use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{CreateProduct, Product};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProduct>,
) -> Result<Json<Product>> {
    input.validate()?;

    let conn = state.db.get()?;
    let product = queries::create_product(&conn, &input)?;

    tracing::info!("Created product {} ({})", product.name, product.id);
    Ok(Json(product))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Product>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (products, total) = queries::list_products_paginated(&conn, limit, offset)?;
    Ok(Json(Paginated::new(products, total, limit, offset)))
}
