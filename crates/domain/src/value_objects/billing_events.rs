/// Signature-verified billing event, normalized away from the provider wire format.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    /// Provider-unique id used for idempotency.
    pub event_id: Option<String>,
    pub event_type: String,
    /// Provider-side unix timestamp of when the event was observed.
    pub created: Option<i64>,
    /// Checkout payload when the event carries one.
    pub checkout: Option<CheckoutSummary>,
}

/// Fields lifted out of a checkout session's metadata.
#[derive(Debug, Clone, Default)]
pub struct CheckoutSummary {
    pub subject_id: Option<String>,
    pub requested_plan: Option<String>,
}
