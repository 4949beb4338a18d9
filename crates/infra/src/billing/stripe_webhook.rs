use std::collections::HashMap;

use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use application::usecases::billing_webhook::BillingWebhookVerifier;
use domain::value_objects::billing_events::{BillingEvent, CheckoutSummary};

type HmacSha256 = Hmac<Sha256>;

/// Checkout metadata keys as the storefront writes them when it creates the
/// session. Their spelling belongs to that wire contract, not to this crate.
const METADATA_SUBJECT_KEY: &str = "discordId";
const METADATA_PLAN_KEY: &str = "plan";

/// Verifies Stripe webhook deliveries and decodes them into billing events.
pub struct StripeWebhookVerifier {
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl StripeWebhookVerifier {
    pub fn new(webhook_secret: String) -> Self {
        Self { webhook_secret }
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in stripe-signature"))?;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(signature)?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid webhook signature");
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

impl BillingWebhookVerifier for StripeWebhookVerifier {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<BillingEvent> {
        let event = self.verify_webhook_signature(payload, signature)?;

        let checkout = Self::extract_checkout_session(&event).map(|session| CheckoutSummary {
            subject_id: session
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get(METADATA_SUBJECT_KEY))
                .cloned(),
            requested_plan: session
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get(METADATA_PLAN_KEY))
                .cloned(),
        });

        Ok(BillingEvent {
            event_id: event.id,
            event_type: event.type_,
            created: event.created,
            checkout,
        })
    }
}
