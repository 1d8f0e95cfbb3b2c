//! End-to-end intake sessions against an in-memory libSQL store.
//!
//! The store is wrapped so tests can take the "remote" offline and bring it
//! back, exercising the cache fallback and the merge protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use patient_intake::config::IntakeConfig;
use patient_intake::error::{DatabaseError, FlowError};
use patient_intake::onboarding::{
    AccountRequest, AnswerMap, AnswerValue, FlowWarning, LocalIdentityProvider,
    OnboardingOrchestrator, OnboardingState, Step, StepInput, StepKind, keys,
};
use patient_intake::store::{LibSqlBackend, PersistedSubmission, SubmissionStore};

/// Store that can be switched offline.
struct SwitchableStore {
    inner: LibSqlBackend,
    offline: AtomicBool,
}

impl SwitchableStore {
    async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            offline: AtomicBool::new(false),
        })
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(DatabaseError::Pool("remote unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubmissionStore for SwitchableStore {
    async fn upsert(
        &self,
        identity_id: Uuid,
        key: &str,
        value: &AnswerValue,
    ) -> Result<(), DatabaseError> {
        self.check()?;
        self.inner.upsert(identity_id, key, value).await
    }

    async fn upsert_many(&self, identity_id: Uuid, fields: &AnswerMap) -> Result<(), DatabaseError> {
        self.check()?;
        self.inner.upsert_many(identity_id, fields).await
    }

    async fn load(&self, identity_id: Uuid) -> Result<Option<PersistedSubmission>, DatabaseError> {
        self.inner.load(identity_id).await
    }
}

struct Harness {
    store: Arc<SwitchableStore>,
    orchestrator: OnboardingOrchestrator,
}

async fn harness() -> Harness {
    let store = SwitchableStore::new().await;
    let orchestrator = OnboardingOrchestrator::new(
        store.clone(),
        Arc::new(LocalIdentityProvider::new()),
        &IntakeConfig::default(),
    );
    Harness {
        store,
        orchestrator,
    }
}

fn answer(s: &str) -> StepInput {
    StepInput::Answer(AnswerValue::text(s))
}

fn account(email: &str) -> StepInput {
    StepInput::Account(AccountRequest::new(email, "s3cure-pass", "Jordan", "Reyes"))
}

/// Canned answer for each question; branch questions take `branch`.
fn canned(key: &str, branch: &str) -> StepInput {
    match key {
        keys::RESIDENCE_STATE => answer("California"),
        keys::DATE_OF_BIRTH => answer("1988-04-12"),
        keys::BIOLOGICAL_SEX => answer("female"),
        keys::HEIGHT_INCHES => answer("65"),
        keys::WEIGHT_LBS => answer("180"),
        keys::GOAL_WEIGHT_LBS => answer("150"),
        keys::PREVIOUSLY_USED_TREATMENT | keys::HAS_MEDICATION_PREFERENCE => answer(branch),
        keys::PRIOR_TREATMENTS | keys::WEIGHT_LOSS_MOTIVATION | keys::MEDICAL_CONDITIONS => {
            StepInput::Answer(AnswerValue::list(["health", "energy"]))
        }
        _ => answer("no"),
    }
}

async fn drive_to(orch: &OnboardingOrchestrator, state: &mut OnboardingState, target: Step, branch: &str) {
    while state.current_step() != target {
        let input = match state.current_step().kind() {
            StepKind::Info => StepInput::Continue,
            StepKind::Question(key) => canned(key, branch),
            StepKind::Account => account("jordan@example.com"),
        };
        orch.submit(state, input).await.unwrap();
    }
}

#[tokio::test]
async fn happy_path_yes_branch_completes() {
    let h = harness().await;
    let mut state = h.orchestrator.start();

    let mut visited = vec![state.current_step()];
    while !state.is_complete() {
        let step = state.current_step();
        let input = match step.kind() {
            StepKind::Info => StepInput::Continue,
            StepKind::Question(key) => canned(key, "yes"),
            StepKind::Account => account("jordan@example.com"),
        };
        let t = h.orchestrator.submit(&mut state, input).await.unwrap();
        assert!(t.warnings.is_empty(), "unexpected warnings at {step}: {:?}", t.warnings);
        visited.push(t.to);
    }

    assert!(visited.contains(&Step::PriorTreatmentDetails));
    assert!(visited.contains(&Step::PreferredMedication));
    assert!(!visited.contains(&Step::TreatmentIntroduction));
    assert!(!visited.contains(&Step::ProviderRecommendation));
    assert_eq!(state.progress(), 100);
    assert!(state.completed_at().is_some());
    assert_eq!(state.responses().temporary_len().await, 0);

    let id = state.identity().unwrap().id;
    let stored = h.store.load(id).await.unwrap().unwrap();
    assert!(stored.is_completed());
    assert!(stored.completed_at().is_some());
    assert_eq!(stored.current_step(), Some(Step::Complete));
    assert_eq!(
        stored.fields.get(keys::PRIOR_TREATMENTS),
        Some(&AnswerValue::list(["health", "energy"]))
    );
    assert_eq!(stored.fields.get(keys::DATE_OF_BIRTH), Some(&AnswerValue::text("1988-04-12")));
    assert_eq!(stored.fields.get(keys::BMI), Some(&AnswerValue::Number(30.0)));
    assert_eq!(stored.fields.get(keys::EMAIL), Some(&AnswerValue::text("jordan@example.com")));
}

#[tokio::test]
async fn answers_before_account_are_merged_at_creation() {
    let h = harness().await;
    let mut state = h.orchestrator.start();

    drive_to(&h.orchestrator, &mut state, Step::GoalWeight, "no").await;
    // Welcome has no answer; five questions were answered before any identity.
    assert_eq!(state.answers().len(), 5);
    assert!(state.responses().temporary_len().await >= 5);

    drive_to(&h.orchestrator, &mut state, Step::ContactPhone, "no").await;
    assert_eq!(state.responses().temporary_len().await, 0);

    let id = state.identity().unwrap().id;
    let stored = h.store.load(id).await.unwrap().unwrap();
    for key in [
        keys::RESIDENCE_STATE,
        keys::DATE_OF_BIRTH,
        keys::BIOLOGICAL_SEX,
        keys::HEIGHT_INCHES,
        keys::WEIGHT_LBS,
        keys::EMAIL,
        keys::FIRST_NAME,
        keys::LAST_NAME,
    ] {
        assert!(stored.fields.contains_key(key), "missing {key}");
    }
    assert_eq!(stored.answers(), *state.answers());
    assert_eq!(stored.current_step(), Some(Step::ContactPhone));
}

#[tokio::test]
async fn offline_merge_is_retried_at_completion() {
    let h = harness().await;
    let mut state = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut state, Step::AccountCreation, "yes").await;

    h.store.set_offline(true);
    let t = h
        .orchestrator
        .submit(&mut state, account("jordan@example.com"))
        .await
        .unwrap();
    assert_eq!(t.to, Step::ContactPhone);
    assert!(matches!(t.warnings.as_slice(), [FlowWarning::MergeFailed { .. }]));
    assert!(state.merge_pending());
    assert!(state.responses().temporary_len().await > 0);

    // Written while offline, so it lands in the cache.
    h.orchestrator.submit(&mut state, answer("555-0100")).await.unwrap();
    h.store.set_offline(false);

    drive_to(&h.orchestrator, &mut state, Step::Complete, "yes").await;
    assert!(!state.merge_pending());
    assert_eq!(state.responses().temporary_len().await, 0);

    let id = state.identity().unwrap().id;
    let stored = h.store.load(id).await.unwrap().unwrap();
    assert!(stored.is_completed());
    assert_eq!(stored.fields.get(keys::PHONE), Some(&AnswerValue::text("555-0100")));
    assert_eq!(stored.fields.get(keys::RESIDENCE_STATE), Some(&AnswerValue::text("California")));
    assert_eq!(stored.fields.get(keys::LAST_NAME), Some(&AnswerValue::text("Reyes")));
}

#[tokio::test]
async fn completion_while_offline_reports_warning() {
    let h = harness().await;
    let mut state = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut state, Step::Review, "no").await;

    h.store.set_offline(true);
    let t = h.orchestrator.submit(&mut state, StepInput::Continue).await.unwrap();
    assert!(t.completed);
    assert!(matches!(
        t.warnings.as_slice(),
        [FlowWarning::CompletionNotDurable { .. }]
    ));
    assert!(state.is_complete());
    assert!(state.responses().temporary_len().await > 0);
}

#[tokio::test]
async fn branches_reconverge_with_equal_progress() {
    let h = harness().await;
    let mut yes = h.orchestrator.start();
    let mut no = h.orchestrator.start();

    drive_to(&h.orchestrator, &mut yes, Step::MedicationPreference, "yes").await;
    drive_to(&h.orchestrator, &mut no, Step::MedicationPreference, "no").await;
    assert_eq!(yes.progress(), no.progress());
    assert!(yes.answer(keys::PRIOR_TREATMENTS).is_some());
    assert!(no.answer(keys::PRIOR_TREATMENTS).is_none());

    drive_to(&h.orchestrator, &mut yes, Step::MedicalConditions, "yes").await;
    drive_to(&h.orchestrator, &mut no, Step::MedicalConditions, "no").await;
    assert_eq!(yes.progress(), no.progress());
}

#[tokio::test]
async fn duplicate_account_blocks_until_retried() {
    let h = harness().await;
    let mut first = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut first, Step::ContactPhone, "no").await;

    let mut second = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut second, Step::AccountCreation, "no").await;
    let err = h
        .orchestrator
        .submit(&mut second, account("Jordan@Example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::AccountCreation(_)));
    assert_eq!(second.current_step(), Step::AccountCreation);
    assert!(second.account_error().is_some());

    let t = h
        .orchestrator
        .submit(&mut second, account("jordan.r@example.com"))
        .await
        .unwrap();
    assert_eq!(t.to, Step::ContactPhone);
    assert_ne!(first.identity().unwrap().id, second.identity().unwrap().id);
}

#[tokio::test]
async fn resume_restores_step_and_answers() {
    let h = harness().await;
    let mut state = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut state, Step::ShippingAddress, "yes").await;
    let identity = state.identity().unwrap().clone();
    let answers = state.answers().clone();
    drop(state);

    let mut resumed = h.orchestrator.resume(identity).await.unwrap();
    assert_eq!(resumed.current_step(), Step::ShippingAddress);
    assert_eq!(resumed.progress(), h.orchestrator.progress_of(Step::ShippingAddress));
    assert_eq!(resumed.answers(), &answers);

    drive_to(&h.orchestrator, &mut resumed, Step::Complete, "yes").await;
    assert!(resumed.completed_at().is_some());
}

#[tokio::test]
async fn resume_before_merge_passes_account_gate() {
    let h = harness().await;
    let mut state = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut state, Step::AccountCreation, "no").await;

    h.store.set_offline(true);
    h.orchestrator
        .submit(&mut state, account("jordan@example.com"))
        .await
        .unwrap();
    let identity = state.identity().unwrap().clone();
    drop(state);
    h.store.set_offline(false);

    // Nothing reached the store, so the session starts over with the identity bound.
    let mut resumed = h.orchestrator.resume(identity).await.unwrap();
    assert_eq!(resumed.current_step(), Step::START);
    drive_to(&h.orchestrator, &mut resumed, Step::AccountCreation, "no").await;
    let t = h
        .orchestrator
        .submit(&mut resumed, StepInput::Continue)
        .await
        .unwrap();
    assert_eq!(t.to, Step::ContactPhone);
    assert!(t.warnings.is_empty());
}

#[tokio::test]
async fn completed_submission_resumes_terminal() {
    let h = harness().await;
    let mut state = h.orchestrator.start();
    drive_to(&h.orchestrator, &mut state, Step::Complete, "no").await;
    let identity = state.identity().unwrap().clone();
    let completed_at = state.completed_at();

    let mut resumed = h.orchestrator.resume(identity).await.unwrap();
    assert!(resumed.is_complete());
    assert_eq!(resumed.progress(), 100);
    assert_eq!(
        resumed.completed_at().map(|t| t.timestamp()),
        completed_at.map(|t| t.timestamp())
    );
    assert!(matches!(
        h.orchestrator.submit(&mut resumed, StepInput::Continue).await,
        Err(FlowError::AlreadyComplete)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_merge_independently() {
    let h = harness().await;
    let orchestrator = Arc::new(h.orchestrator);

    let mut handles = Vec::new();
    for n in 0..12 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let mut state = orchestrator.start();
            let mut warnings = Vec::new();
            while !state.is_complete() {
                let input = match state.current_step().kind() {
                    StepKind::Info => StepInput::Continue,
                    StepKind::Question(key) => canned(key, if n % 2 == 0 { "yes" } else { "no" }),
                    StepKind::Account => account(&format!("patient{n}@example.com")),
                };
                let t = orchestrator.submit(&mut state, input).await.unwrap();
                warnings.extend(t.warnings);
            }
            (state.identity().unwrap().id, state.answers().clone(), warnings)
        }));
    }

    for handle in handles {
        let (id, answers, warnings) = handle.await.unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        let stored = h.store.load(id).await.unwrap().unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.answers(), answers);
    }
}
