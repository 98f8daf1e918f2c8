pub mod fulfillment;
pub mod idempotency;
pub mod onboarding;
pub mod order_lifecycle;
pub mod orders;
