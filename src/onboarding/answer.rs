//! Answer data model: values, question keys, and step inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::AccountRequest;

/// A single answer value as produced by a step renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AnswerValue {
    /// No value; what unparseable dates and measurements normalize to.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl AnswerValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Variant name, for logs and routing errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
        }
    }
}

impl std::fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "(none)"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Cumulative question key → value map. Keys are unique; last write wins.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// What a renderer hands back when the user completes a step.
#[derive(Debug, Clone)]
pub enum StepInput {
    /// Informational step acknowledged.
    Continue,
    /// Answer to the step's question.
    Answer(AnswerValue),
    /// Account details for the account-creation gate.
    Account(AccountRequest),
}

impl StepInput {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Answer(_) => "answer",
            Self::Account(_) => "account",
        }
    }
}

/// Question keys used as persistence keys throughout the flow.
pub mod keys {
    pub const RESIDENCE_STATE: &str = "residence_state";
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    pub const BIOLOGICAL_SEX: &str = "biological_sex";
    pub const HEIGHT_INCHES: &str = "height_inches";
    pub const WEIGHT_LBS: &str = "weight_lbs";
    pub const GOAL_WEIGHT_LBS: &str = "goal_weight_lbs";
    pub const WEIGHT_LOSS_MOTIVATION: &str = "weight_loss_motivation";
    pub const PREVIOUSLY_USED_TREATMENT: &str = "previously_used_treatment";
    pub const PRIOR_TREATMENTS: &str = "prior_treatments";
    pub const HAS_MEDICATION_PREFERENCE: &str = "has_medication_preference";
    pub const PREFERRED_MEDICATION: &str = "preferred_medication";
    pub const MEDICAL_CONDITIONS: &str = "medical_conditions";
    pub const CURRENT_MEDICATIONS: &str = "current_medications";
    pub const ALLERGIES: &str = "allergies";
    pub const PREGNANCY_STATUS: &str = "pregnancy_status";
    pub const EATING_DISORDER_HISTORY: &str = "eating_disorder_history";
    pub const THYROID_CANCER_HISTORY: &str = "thyroid_cancer_history";
    pub const PANCREATITIS_HISTORY: &str = "pancreatitis_history";
    pub const ACTIVITY_LEVEL: &str = "activity_level";
    pub const SLEEP_HOURS: &str = "sleep_hours";
    pub const ALCOHOL_USE: &str = "alcohol_use";
    pub const SMOKING_STATUS: &str = "smoking_status";
    pub const DIETARY_PREFERENCES: &str = "dietary_preferences";
    pub const STRESS_LEVEL: &str = "stress_level";
    pub const PHONE: &str = "phone";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const TELEHEALTH_CONSENT: &str = "telehealth_consent";

    // Account gate fields.
    pub const EMAIL: &str = "email";
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";

    // Derived at completion.
    pub const BMI: &str = "bmi";

    // Reserved bookkeeping fields on the durable submission.
    pub const CURRENT_STEP: &str = "current_step";
    pub const COMPLETED_AT: &str = "completed_at";
    pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";

    /// Fields the engine writes for itself rather than collecting from the user.
    pub const RESERVED: [&str; 3] = [CURRENT_STEP, COMPLETED_AT, ONBOARDING_COMPLETED];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}
