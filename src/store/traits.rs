//! `SubmissionStore` trait: the remote persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::answer::{AnswerMap, AnswerValue, keys};
use crate::onboarding::step::Step;

/// Durable intake record for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSubmission {
    pub identity_id: Uuid,
    /// Every stored field, including the reserved bookkeeping fields.
    pub fields: AnswerMap,
    /// Most recent write to any field.
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedSubmission {
    /// The resume marker, if present and recognised.
    pub fn current_step(&self) -> Option<Step> {
        self.fields
            .get(keys::CURRENT_STEP)
            .and_then(AnswerValue::as_str)
            .and_then(Step::from_id)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(keys::COMPLETED_AT)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.fields.get(keys::ONBOARDING_COMPLETED),
            Some(AnswerValue::Bool(true))
        )
    }

    /// Answer fields only, without the reserved bookkeeping fields.
    pub fn answers(&self) -> AnswerMap {
        self.fields
            .iter()
            .filter(|(k, _)| !keys::is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Backend-agnostic store for intake submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert or replace a single field.
    async fn upsert(
        &self,
        identity_id: Uuid,
        key: &str,
        value: &AnswerValue,
    ) -> Result<(), DatabaseError>;

    /// Insert or replace many fields atomically.
    async fn upsert_many(&self, identity_id: Uuid, fields: &AnswerMap)
    -> Result<(), DatabaseError>;

    /// Load the submission, or `None` if nothing was stored for the identity.
    async fn load(&self, identity_id: Uuid) -> Result<Option<PersistedSubmission>, DatabaseError>;
}
