pub mod client;
pub mod mail_domain;
pub mod mailbox;
pub mod onboarding;
pub mod order;
pub mod persona;
pub mod subscription;
pub mod webhook_event;
