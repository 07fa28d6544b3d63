use axum::{extract::State, response::Redirect};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::Query;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub session: String,
}

/// Where the payment provider sends the buyer after checkout.
///
/// The webhook, not this redirect, is what completes a session; the buyer
/// can land here before the webhook has been delivered. In that case the
/// success page is told `status=pending` and polls from there.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect> {
    let conn = state.db.get()?;

    let session = queries::get_checkout_session(&conn, &query.session)?
        .or_not_found(msg::SESSION_NOT_FOUND)?;

    let status = if session.completed { "success" } else { "pending" };
    let redirect_url = append_query_params(
        &state.success_page_url,
        &[("session", &session.id), ("status", status)],
    );

    Ok(Redirect::temporary(&redirect_url))
}

/// Append query parameters to a URL
fn append_query_params(base_url: &str, params: &[(&str, &str)]) -> String {
    let query_string: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{}&{}", base_url, query_string)
    } else {
        format!("{}?{}", base_url, query_string)
    }
}
