pub mod fulfillment;
pub mod onboarding;
pub mod orders;
pub mod payment_webhooks;
