//! Error types for the patient intake engine.

use std::time::Duration;

use crate::onboarding::step::Step;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the external account-creation service.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("An account already exists for {email}")]
    AlreadyExists { email: String },

    #[error("Invalid account details: {reason}")]
    Invalid { reason: String },

    #[error("Identity service request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Identity service timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid response from identity service: {reason}")]
    InvalidResponse { reason: String },
}

/// Failure of a single answer write.
///
/// These never reach the user: the response store recovers them by falling
/// back to the temporary answer cache.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("No identity yet; answer {key} cannot be stored remotely")]
    NoIdentity { key: String },

    #[error("Remote write of {key} failed: {source}")]
    Remote {
        key: String,
        #[source]
        source: DatabaseError,
    },
}

/// The step graph was asked for a transition it does not define.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Step {step} is terminal and has no successor")]
    Terminal { step: Step },

    #[error("Step {step} cannot route on input: {input}")]
    UnexpectedInput { step: Step, input: String },
}

/// Errors surfaced by the onboarding orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Step {step} expects {expected} input, got {got}")]
    InputMismatch {
        step: Step,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("Account creation failed: {0}")]
    AccountCreation(#[from] IdentityError),

    #[error("Onboarding is already complete")]
    AlreadyComplete,

    #[error("Failed to load submission: {0}")]
    Load(#[from] DatabaseError),
}
