pub mod billing_webhook;
pub mod plan_resolver;
pub mod role_projector;
