//! Patient Intake: step-graph onboarding engine with resilient answer storage.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
