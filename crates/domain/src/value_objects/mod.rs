pub mod billing_events;
pub mod enums;
pub mod plans;
pub mod role_sync;
