//! OnboardingOrchestrator: drives intake sessions through the step graph and
//! the account gate.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::IntakeConfig;
use crate::error::FlowError;
use crate::store::SubmissionStore;

use super::answer::{AnswerValue, StepInput, keys};
use super::graph::StepGraph;
use super::identity::{AccountRequest, Identity, IdentityProvider};
use super::normalize::{NormalizerRegistry, derive_bmi};
use super::progress::ProgressCalculator;
use super::responses::ResponseStore;
use super::state::OnboardingState;
use super::step::{Step, StepKind};

/// Non-fatal problem reported alongside a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowWarning {
    /// Cached answers could not be merged into the durable submission.
    MergeFailed { reason: String },
    /// Completion fields may not have reached the durable submission.
    CompletionNotDurable { reason: String },
}

impl std::fmt::Display for FlowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MergeFailed { reason } => write!(f, "some answers were not saved yet: {reason}"),
            Self::CompletionNotDurable { reason } => {
                write!(f, "completion was not fully saved: {reason}")
            }
        }
    }
}

/// Outcome of one successful step submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: Step,
    pub to: Step,
    pub progress: u8,
    /// Whether this transition reached the terminal step.
    pub completed: bool,
    pub warnings: Vec<FlowWarning>,
}

/// Drives intake sessions. Holds only shared collaborators; every piece of
/// session state lives in the [`OnboardingState`] passed to each call.
pub struct OnboardingOrchestrator {
    graph: StepGraph,
    normalizers: NormalizerRegistry,
    progress: ProgressCalculator,
    store: Arc<dyn SubmissionStore>,
    identities: Arc<dyn IdentityProvider>,
    merge_retries: u32,
    write_retries: u32,
}

impl OnboardingOrchestrator {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        identities: Arc<dyn IdentityProvider>,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            graph: StepGraph::new(),
            normalizers: NormalizerRegistry::default(),
            progress: ProgressCalculator::default(),
            store,
            identities,
            merge_retries: config.merge_retries,
            write_retries: config.write_retries,
        }
    }

    /// Replace the normalization registry.
    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn progress_of(&self, step: Step) -> u8 {
        self.progress.progress(step)
    }

    /// Begin a new session at the start step.
    pub fn start(&self) -> OnboardingState {
        OnboardingState::new(self.response_store())
    }

    /// Rebuild a session for an existing identity from its durable submission.
    ///
    /// The current step comes from the resume marker (start step if missing),
    /// answers from the stored non-reserved fields. A completed submission
    /// resumes on the terminal step without re-running completion.
    pub async fn resume(&self, identity: Identity) -> Result<OnboardingState, FlowError> {
        let submission = self.store.load(identity.id).await?;

        let mut state = self.start();
        state.responses.bind_identity(identity.clone()).await;

        if let Some(ref sub) = submission {
            state.answers = sub.answers();
            state.completed_at = sub.completed_at();
            state.current_step = if sub.is_completed() || state.completed_at.is_some() {
                Step::TERMINAL
            } else {
                sub.current_step().unwrap_or(Step::START)
            };
        }
        state.progress = self.progress.progress(state.current_step);

        info!(
            identity_id = %identity.id,
            step = %state.current_step,
            answers = state.answers.len(),
            found = submission.is_some(),
            "Intake session resumed"
        );
        state.identity = Some(identity);
        Ok(state)
    }

    /// Apply one user action to the session.
    ///
    /// Persistence failures never fail this call. Errors mean the state did
    /// not advance: wrong input kind, unroutable branch input, a failed
    /// account creation, or an already finished flow.
    pub async fn submit(
        &self,
        state: &mut OnboardingState,
        input: StepInput,
    ) -> Result<Transition, FlowError> {
        let step = state.current_step;
        if step.is_terminal() {
            return Err(FlowError::AlreadyComplete);
        }

        match (step.kind(), input) {
            (StepKind::Info, StepInput::Continue) => {
                let next = self.route(step, &StepInput::Continue)?;
                Ok(self.advance(state, next, Vec::new()).await)
            }
            (StepKind::Question(key), StepInput::Answer(raw)) => {
                let value = self.normalizers.normalize(key, &raw);
                let next = self.route(step, &StepInput::Answer(value.clone()))?;
                state.answers.insert(key.to_string(), value.clone());
                self.persist(state, key, &value).await;
                Ok(self.advance(state, next, Vec::new()).await)
            }
            // A resumed session already owns an identity and only needs the merge.
            (StepKind::Account, StepInput::Continue | StepInput::Account(_))
                if state.identity.is_some() =>
            {
                let next = self.route(step, &StepInput::Continue)?;
                let warnings = self.merge_cached(state).await.into_iter().collect();
                Ok(self.advance(state, next, warnings).await)
            }
            (StepKind::Account, StepInput::Account(request)) => {
                self.create_account(state, request).await
            }
            (kind, input) => Err(FlowError::InputMismatch {
                step,
                expected: kind.label(),
                got: input.label(),
            }),
        }
    }

    fn response_store(&self) -> ResponseStore {
        ResponseStore::new(Arc::clone(&self.store), self.write_retries)
    }

    fn route(&self, step: Step, input: &StepInput) -> Result<Step, FlowError> {
        self.graph.next(step, input).map_err(|e| {
            error!(step = %step, error = %e, "No transition for submitted input");
            FlowError::from(e)
        })
    }

    /// Best-effort write; the flow never waits on its outcome.
    async fn persist(&self, state: &OnboardingState, key: &str, value: &AnswerValue) {
        if let Err(e) = state.responses.write(key, value).await {
            warn!(key, error = %e, "Answer could not be stored");
        }
    }

    async fn advance(
        &self,
        state: &mut OnboardingState,
        next: Step,
        mut warnings: Vec<FlowWarning>,
    ) -> Transition {
        let from = state.current_step;
        state.current_step = next;
        state.progress = self.progress.progress(next);
        self.persist(state, keys::CURRENT_STEP, &AnswerValue::text(next.as_str()))
            .await;

        let completed = next.is_terminal();
        if completed {
            warnings.extend(self.complete(state).await);
        }

        info!(from = %from, to = %next, progress = state.progress, "Intake step advanced");
        Transition {
            from,
            to: next,
            progress: state.progress,
            completed,
            warnings,
        }
    }

    /// The account gate: the one blocking call in the flow.
    async fn create_account(
        &self,
        state: &mut OnboardingState,
        request: AccountRequest,
    ) -> Result<Transition, FlowError> {
        let step = state.current_step;
        let next = self.route(step, &StepInput::Continue)?;

        let created = match request.validate() {
            Ok(()) => self.identities.create_identity(&request).await,
            Err(e) => Err(e),
        };
        let identity = match created {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Account creation failed");
                state.account_error = Some(e.to_string());
                return Err(FlowError::AccountCreation(e));
            }
        };

        info!(identity_id = %identity.id, "Account created, binding intake answers");
        state.account_error = None;
        state.responses.bind_identity(identity.clone()).await;
        state.identity = Some(identity);

        for (key, raw) in [
            (keys::EMAIL, request.email),
            (keys::FIRST_NAME, request.first_name),
            (keys::LAST_NAME, request.last_name),
        ] {
            let value = self.normalizers.normalize(key, &AnswerValue::Text(raw));
            state.answers.insert(key.to_string(), value);
        }

        let warnings = self.merge_cached(state).await.into_iter().collect();
        Ok(self.advance(state, next, warnings).await)
    }

    /// Merge cached answers and the in-memory map into the durable record.
    async fn merge_cached(&self, state: &mut OnboardingState) -> Option<FlowWarning> {
        let identity_id = state.identity.as_ref()?.id;
        match state
            .responses
            .merge(identity_id, &state.answers, self.merge_retries)
            .await
        {
            Ok(_) => {
                state.merge_pending = false;
                None
            }
            Err(e) => {
                warn!(identity_id = %identity_id, error = %e, "Answer merge failed");
                state.merge_pending = true;
                Some(FlowWarning::MergeFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Terminal side effects. Runs at most once per session.
    async fn complete(&self, state: &mut OnboardingState) -> Vec<FlowWarning> {
        if state.completed_at.is_some() {
            return Vec::new();
        }

        if let Some(bmi) = derive_bmi(&state.answers) {
            let value = self.normalizers.normalize(keys::BMI, &AnswerValue::Number(bmi));
            state.answers.insert(keys::BMI.to_string(), value.clone());
            self.persist(state, keys::BMI, &value).await;
        }

        let now = Utc::now();
        state.completed_at = Some(now);
        self.persist(state, keys::COMPLETED_AT, &AnswerValue::text(now.to_rfc3339()))
            .await;
        self.persist(state, keys::ONBOARDING_COMPLETED, &AnswerValue::Bool(true))
            .await;

        let mut warnings = Vec::new();
        if state.identity.is_none() {
            warnings.push(FlowWarning::CompletionNotDurable {
                reason: "no account was created".to_string(),
            });
        } else if state.merge_pending || state.responses.temporary_len().await > 0 {
            // Anything that fell back to the cache gets one more chance.
            if let Some(FlowWarning::MergeFailed { reason }) = self.merge_cached(state).await {
                warnings.push(FlowWarning::CompletionNotDurable { reason });
            }
        }

        info!(completed_at = %now, "Intake completed");
        warnings
    }
}
