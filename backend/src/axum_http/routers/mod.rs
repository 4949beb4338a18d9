pub mod billing_webhook;
pub mod entitlements;
