pub mod billing_cadences;
pub mod downgrade_policies;
pub mod plan_ids;
