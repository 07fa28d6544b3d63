use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rusqlite::{Connection, TransactionBehavior};

use crate::coupons::{self, RedeemOutcome};
use crate::db::{AppState, queries};
use crate::payments::{EVENT_CHECKOUT_COMPLETED, PaymentWebhookEvent};

/// Webhook responses are bare status/text pairs. Anything other than a 5xx
/// tells the provider to stop retrying, so expected oddities (unknown event
/// types, replays, sessions we no longer know) all answer 200.
pub type WebhookResponse = (StatusCode, &'static str);

/// Axum handler for the payment provider's event deliveries.
///
/// Order matters: the signature is checked before the body is parsed, so
/// unsigned garbage never reaches the JSON layer, and nothing is written
/// before the session claim succeeds.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    let Some(signature) = headers
        .get("payment-signature")
        .and_then(|value| value.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing Payment-Signature header");
    };

    match state.payments.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => {
            tracing::debug!("Malformed webhook signature header: {}", e);
            return (StatusCode::BAD_REQUEST, "Malformed signature header");
        }
    }

    let event: PaymentWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Failed to parse payment webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    if event.event_type != EVENT_CHECKOUT_COMPLETED {
        tracing::debug!("Ignoring payment event type: {}", event.event_type);
        return (StatusCode::OK, "Event ignored");
    }

    let Some(session_id) = event.data.session_id else {
        // Signed and well-formed, but about a checkout we did not start.
        tracing::warn!("Completed-checkout event {} carries no session id", event.id);
        return (StatusCode::OK, "No session reference");
    };

    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Failed to get db connection for webhook: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
        }
    };

    process_completed_checkout(&mut conn, &session_id)
}

/// Finalize one completed checkout: claim the session, then convert its
/// coupon reservation (if any) into a redemption.
///
/// Both writes share a single IMMEDIATE transaction. The claim is a
/// compare-and-swap on `completed`, so replayed deliveries lose it and leave
/// without touching the ledger; a storage failure after the claim rolls the
/// whole step back and lets the provider retry cleanly.
pub fn process_completed_checkout(conn: &mut Connection, session_id: &str) -> WebhookResponse {
    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start webhook transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let session = match queries::get_checkout_session(&tx, session_id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::warn!("Payment webhook for unknown session {}", session_id);
            return (StatusCode::OK, "Unknown session");
        }
        Err(e) => {
            tracing::error!("Failed to load checkout session {}: {}", session_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    match queries::try_claim_checkout_session(&tx, session_id) {
        Ok(true) => {}
        Ok(false) => {
            // Replayed delivery; the first one already finalized everything.
            return (StatusCode::OK, "Already processed");
        }
        Err(e) => {
            tracing::error!("Failed to claim checkout session {}: {}", session_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    if let Some(ref reservation_id) = session.reservation_id {
        match coupons::redeem_in_tx(&tx, reservation_id, session.discount_cents) {
            Ok(RedeemOutcome::Finalized(finalization)) => {
                tracing::info!(
                    "Coupon {} redeemed by {} for session {} ({} cents off)",
                    finalization.redemption.coupon_id,
                    finalization.redemption.customer_email,
                    session_id,
                    finalization.redemption.discount_amount
                );
            }
            Ok(RedeemOutcome::Rejected(rejection)) => {
                // The buyer already paid the discounted price; the purchase
                // stands either way. The coupon just is not counted.
                tracing::warn!(
                    "Reservation {} not redeemable at finalize time ({}), session {} completes without it",
                    reservation_id,
                    rejection,
                    session_id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to redeem reservation {} for session {}: {}",
                    reservation_id,
                    session_id,
                    e
                );
                // Rolls back the claim on drop so the provider can retry.
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to finalize coupon");
            }
        }
    }

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit webhook transaction: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    tracing::info!("Checkout session {} completed", session_id);
    (StatusCode::OK, "ok")
}
