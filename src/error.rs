use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payment provider error: {0}")]
    Payment(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Payment(e) => {
                tracing::error!("Payment provider error: {}", e);
                (StatusCode::BAD_GATEWAY, "Payment provider error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Shorthand for the common `Option -> NotFound` conversion in handlers.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.into()))
    }
}

/// Shared error message constants so handlers and tests agree on wording.
pub mod msg {
    pub const PRODUCT_NOT_FOUND: &str = "Product not found";
    pub const COUPON_NOT_FOUND: &str = "Coupon not found";
    pub const SESSION_NOT_FOUND: &str = "Session not found";

    pub const NAME_EMPTY: &str = "Name cannot be empty";
    pub const PRICE_NEGATIVE: &str = "Price cannot be negative";
    pub const EMAIL_EMPTY: &str = "Email cannot be empty";

    pub const COUPON_CODE_EMPTY: &str = "Coupon code cannot be empty";
    pub const COUPON_CODE_INVALID: &str =
        "Coupon code may only contain letters, digits, '-' and '_'";
    pub const COUPON_CODE_TAKEN: &str = "A coupon with this code already exists";
    pub const COUPON_WINDOW_INVERTED: &str = "starts_at must be before expires_at";
    pub const DISCOUNT_PERCENT_RANGE: &str = "Percentage discounts must be between 1 and 100";
    pub const DISCOUNT_VALUE_INVALID: &str = "Discount value must be positive";
    pub const USAGE_LIMIT_INVALID: &str = "Usage limits must be at least 1";
    pub const USAGE_COUNT_NEGATIVE: &str = "Usage count cannot be negative";

    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
}
