//! Per-session onboarding state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::answer::{AnswerMap, AnswerValue};
use super::identity::Identity;
use super::responses::ResponseStore;
use super::step::Step;

/// Working memory of one intake session.
///
/// Created by [`OnboardingOrchestrator::start`] or
/// [`OnboardingOrchestrator::resume`] and passed by `&mut` to every
/// transition. Sessions share nothing, so any number can run side by side.
///
/// [`OnboardingOrchestrator::start`]: super::OnboardingOrchestrator::start
/// [`OnboardingOrchestrator::resume`]: super::OnboardingOrchestrator::resume
pub struct OnboardingState {
    pub(super) current_step: Step,
    pub(super) answers: AnswerMap,
    pub(super) progress: u8,
    pub(super) identity: Option<Identity>,
    /// Last account-creation failure, shown on the gate step.
    pub(super) account_error: Option<String>,
    pub(super) completed_at: Option<DateTime<Utc>>,
    /// Set while the identity-time merge has not yet succeeded.
    pub(super) merge_pending: bool,
    pub(super) responses: ResponseStore,
}

impl OnboardingState {
    pub(super) fn new(responses: ResponseStore) -> Self {
        Self {
            current_step: Step::START,
            answers: AnswerMap::new(),
            progress: 0,
            identity: None,
            account_error: None,
            completed_at: None,
            merge_pending: false,
            responses,
        }
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    /// All answers collected so far, normalized.
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn answer(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key)
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn account_error(&self) -> Option<&str> {
        self.account_error.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.current_step.is_terminal()
    }

    /// Whether answers gathered before account creation still await their merge.
    pub fn merge_pending(&self) -> bool {
        self.merge_pending
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

}

impl std::fmt::Debug for OnboardingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingState")
            .field("current_step", &self.current_step)
            .field("answers", &self.answers.len())
            .field("progress", &self.progress)
            .field("identity", &self.identity.as_ref().map(|i| i.id))
            .field("completed_at", &self.completed_at)
            .field("merge_pending", &self.merge_pending)
            .finish()
    }
}

/// Where a session stands, as reported to front-ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<Uuid>,
    pub current_step: Step,
    pub progress: u8,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
