//! Intake onboarding: a fixed questionnaire walked one step at a time.
//!
//! The [`OnboardingOrchestrator`] owns the step graph, answer normalization,
//! progress, and the account gate. Each session keeps its own
//! [`OnboardingState`], whose [`ResponseStore`] writes answers to the durable
//! submission once an identity exists and to a local cache before that.

pub mod answer;
pub mod graph;
pub mod identity;
pub mod normalize;
pub mod orchestrator;
pub mod progress;
pub mod responses;
pub mod routes;
pub mod state;
pub mod step;

pub use answer::{AnswerMap, AnswerValue, StepInput, keys};
pub use graph::{Edge, StepGraph};
pub use identity::{
    AccountRequest, HttpIdentityProvider, Identity, IdentityProvider, LocalIdentityProvider,
};
pub use normalize::{NormalizerRegistry, Strategy, derive_bmi};
pub use orchestrator::{FlowWarning, OnboardingOrchestrator, Transition};
pub use progress::ProgressCalculator;
pub use responses::{Landed, ResponseStore, TemporaryAnswerCache};
pub use routes::{IntakeRouteState, intake_routes};
pub use state::{IntakeStatus, OnboardingState};
pub use step::{Step, StepKind};
