//! Client for the hosted-checkout payment provider.
//!
//! The provider speaks a Stripe-style API: sessions are created with a form
//! POST and billed ad hoc from `price_data` amounts, and webhooks arrive
//! signed with an HMAC over `"{timestamp}.{body}"`.

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result, msg};

type HmacSha256 = Hmac<Sha256>;

/// Webhook event type emitted when a buyer completes payment.
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: String,
    url: String,
}

/// Envelope of every webhook the provider sends.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEventData {
    /// Our checkout session id, echoed back from the metadata we attached
    /// at session creation.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentClient {
    client: Client,
    api_url: String,
    api_key: String,
    webhook_secret: String,
}

impl PaymentClient {
    pub fn new(api_url: &str, api_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Whether an API key is present. Checkout is refused up front when it
    /// is not, instead of failing over the wire.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Create a hosted checkout session charging `total_cents` once.
    ///
    /// Our `session_id` rides along as metadata so the completion webhook
    /// can be tied back to the local checkout_sessions row. Returns the
    /// provider's session id and the URL to send the buyer to.
    pub async fn create_checkout_session(
        &self,
        session_id: &str,
        description: &str,
        total_cents: i64,
        currency: &str,
        customer_email: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let amount = total_cents.to_string();
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_url))
            .basic_auth(&self.api_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
                ("customer_email", customer_email),
                ("line_items[0][price_data][currency]", currency),
                ("line_items[0][price_data][unit_amount]", &amount),
                ("line_items[0][price_data][product_data][name]", description),
                ("line_items[0][quantity]", "1"),
                ("metadata[session_id]", session_id),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Payment API error: {}",
                error_text
            )));
        }

        let session: CreateSessionResponse = response.json().await?;
        Ok((session.id, session.url))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Timestamps slightly in the future are tolerated (clock skew), beyond
    /// that they are rejected like stale ones.
    const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

    /// Check the `Payment-Signature` header value against the raw body.
    ///
    /// Header format: `t=<unix ts>,v1=<hex hmac-sha256>`. The MAC covers
    /// `"{t}.{body}"`, so neither the timestamp nor the payload can be
    /// swapped without invalidating the signature. A malformed header is an
    /// error; a well-formed header that fails the check is `Ok(false)`.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let (timestamp_str, provided_hex) = split_signature_header(signature)?;

        // Captured deliveries stop replaying once the timestamp ages out.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;
        let age = chrono::Utc::now().timestamp() - timestamp;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS || age < -Self::WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!("Rejecting webhook with out-of-window timestamp (age {}s)", age);
            return Ok(false);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Webhook secret unusable".into()))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Length is not secret (always 64 hex chars), so this early exit
        // leaks nothing; the content compare stays constant-time.
        if expected.len() != provided_hex.len() {
            return Ok(false);
        }
        Ok(expected.as_bytes().ct_eq(provided_hex.as_bytes()).into())
    }
}

/// Pull the `t=` and `v1=` parts out of a signature header. Unknown parts
/// are ignored; a header missing either required part is rejected.
fn split_signature_header(header: &str) -> Result<(&str, &str)> {
    let mut timestamp = None;
    let mut provided = None;
    for part in header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(sig) = part.strip_prefix("v1=") {
            provided = Some(sig);
        }
    }
    match (timestamp, provided) {
        (Some(t), Some(sig)) => Ok((t, sig)),
        _ => Err(AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into())),
    }
}
