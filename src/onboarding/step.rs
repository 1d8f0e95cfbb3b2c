//! Intake steps: the closed, ordered enumeration the flow moves through.

use serde::{Deserialize, Serialize};

use super::answer::keys;

/// A single screen of the intake questionnaire.
///
/// Declaration order is the canonical ordering used for progress. The two
/// arms of each branch point sit next to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Welcome,
    ResidenceState,
    DateOfBirth,
    BiologicalSex,
    Height,
    Weight,
    GoalWeight,
    BmiSummary,
    WeightLossMotivation,
    PriorTreatment,
    PriorTreatmentDetails,
    TreatmentIntroduction,
    MedicationPreference,
    PreferredMedication,
    ProviderRecommendation,
    MedicalConditions,
    CurrentMedications,
    Allergies,
    PregnancyStatus,
    EatingDisorderHistory,
    ThyroidCancerHistory,
    PancreatitisHistory,
    ActivityLevel,
    SleepHours,
    AlcoholUse,
    SmokingStatus,
    DietaryPreferences,
    StressLevel,
    AccountCreation,
    ContactPhone,
    ShippingAddress,
    TelehealthConsent,
    Review,
    Complete,
}

/// What a step expects the renderer to hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Informational screen; the user just continues.
    Info,
    /// Asks one question whose answer is stored under the given key.
    Question(&'static str),
    /// The account-creation gate.
    Account,
}

impl StepKind {
    /// Short label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "continue",
            Self::Question(_) => "answer",
            Self::Account => "account",
        }
    }
}

impl Step {
    /// Every step in canonical order.
    pub const ALL: [Step; 34] = [
        Step::Welcome,
        Step::ResidenceState,
        Step::DateOfBirth,
        Step::BiologicalSex,
        Step::Height,
        Step::Weight,
        Step::GoalWeight,
        Step::BmiSummary,
        Step::WeightLossMotivation,
        Step::PriorTreatment,
        Step::PriorTreatmentDetails,
        Step::TreatmentIntroduction,
        Step::MedicationPreference,
        Step::PreferredMedication,
        Step::ProviderRecommendation,
        Step::MedicalConditions,
        Step::CurrentMedications,
        Step::Allergies,
        Step::PregnancyStatus,
        Step::EatingDisorderHistory,
        Step::ThyroidCancerHistory,
        Step::PancreatitisHistory,
        Step::ActivityLevel,
        Step::SleepHours,
        Step::AlcoholUse,
        Step::SmokingStatus,
        Step::DietaryPreferences,
        Step::StressLevel,
        Step::AccountCreation,
        Step::ContactPhone,
        Step::ShippingAddress,
        Step::TelehealthConsent,
        Step::Review,
        Step::Complete,
    ];

    /// The step every new flow starts on.
    pub const START: Step = Step::Welcome;

    /// The absorbing final step.
    pub const TERMINAL: Step = Step::Complete;

    /// Whether this step is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Position in the canonical ordering.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn kind(&self) -> StepKind {
        use Step::*;
        match self {
            Welcome | BmiSummary | TreatmentIntroduction | ProviderRecommendation | Review
            | Complete => StepKind::Info,
            AccountCreation => StepKind::Account,
            ResidenceState => StepKind::Question(keys::RESIDENCE_STATE),
            DateOfBirth => StepKind::Question(keys::DATE_OF_BIRTH),
            BiologicalSex => StepKind::Question(keys::BIOLOGICAL_SEX),
            Height => StepKind::Question(keys::HEIGHT_INCHES),
            Weight => StepKind::Question(keys::WEIGHT_LBS),
            GoalWeight => StepKind::Question(keys::GOAL_WEIGHT_LBS),
            WeightLossMotivation => StepKind::Question(keys::WEIGHT_LOSS_MOTIVATION),
            PriorTreatment => StepKind::Question(keys::PREVIOUSLY_USED_TREATMENT),
            PriorTreatmentDetails => StepKind::Question(keys::PRIOR_TREATMENTS),
            MedicationPreference => StepKind::Question(keys::HAS_MEDICATION_PREFERENCE),
            PreferredMedication => StepKind::Question(keys::PREFERRED_MEDICATION),
            MedicalConditions => StepKind::Question(keys::MEDICAL_CONDITIONS),
            CurrentMedications => StepKind::Question(keys::CURRENT_MEDICATIONS),
            Allergies => StepKind::Question(keys::ALLERGIES),
            PregnancyStatus => StepKind::Question(keys::PREGNANCY_STATUS),
            EatingDisorderHistory => StepKind::Question(keys::EATING_DISORDER_HISTORY),
            ThyroidCancerHistory => StepKind::Question(keys::THYROID_CANCER_HISTORY),
            PancreatitisHistory => StepKind::Question(keys::PANCREATITIS_HISTORY),
            ActivityLevel => StepKind::Question(keys::ACTIVITY_LEVEL),
            SleepHours => StepKind::Question(keys::SLEEP_HOURS),
            AlcoholUse => StepKind::Question(keys::ALCOHOL_USE),
            SmokingStatus => StepKind::Question(keys::SMOKING_STATUS),
            DietaryPreferences => StepKind::Question(keys::DIETARY_PREFERENCES),
            StressLevel => StepKind::Question(keys::STRESS_LEVEL),
            ContactPhone => StepKind::Question(keys::PHONE),
            ShippingAddress => StepKind::Question(keys::SHIPPING_ADDRESS),
            TelehealthConsent => StepKind::Question(keys::TELEHEALTH_CONSENT),
        }
    }

    /// The snake_case identifier, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        use Step::*;
        match self {
            Welcome => "welcome",
            ResidenceState => "residence_state",
            DateOfBirth => "date_of_birth",
            BiologicalSex => "biological_sex",
            Height => "height",
            Weight => "weight",
            GoalWeight => "goal_weight",
            BmiSummary => "bmi_summary",
            WeightLossMotivation => "weight_loss_motivation",
            PriorTreatment => "prior_treatment",
            PriorTreatmentDetails => "prior_treatment_details",
            TreatmentIntroduction => "treatment_introduction",
            MedicationPreference => "medication_preference",
            PreferredMedication => "preferred_medication",
            ProviderRecommendation => "provider_recommendation",
            MedicalConditions => "medical_conditions",
            CurrentMedications => "current_medications",
            Allergies => "allergies",
            PregnancyStatus => "pregnancy_status",
            EatingDisorderHistory => "eating_disorder_history",
            ThyroidCancerHistory => "thyroid_cancer_history",
            PancreatitisHistory => "pancreatitis_history",
            ActivityLevel => "activity_level",
            SleepHours => "sleep_hours",
            AlcoholUse => "alcohol_use",
            SmokingStatus => "smoking_status",
            DietaryPreferences => "dietary_preferences",
            StressLevel => "stress_level",
            AccountCreation => "account_creation",
            ContactPhone => "contact_phone",
            ShippingAddress => "shipping_address",
            TelehealthConsent => "telehealth_consent",
            Review => "review",
            Complete => "complete",
        }
    }

    /// Parse the snake_case identifier back into a step.
    pub fn from_id(id: &str) -> Option<Step> {
        Self::ALL.into_iter().find(|s| s.as_str() == id)
    }

    /// Prompt shown by text front-ends.
    pub fn prompt(&self) -> &'static str {
        use Step::*;
        match self {
            Welcome => "Welcome! This short questionnaire helps your care team get to know you.",
            ResidenceState => "Which US state do you live in?",
            DateOfBirth => "What is your date of birth? (YYYY-MM-DD)",
            BiologicalSex => "What was your sex assigned at birth?",
            Height => "How tall are you, in inches?",
            Weight => "What is your current weight, in pounds?",
            GoalWeight => "What is your goal weight, in pounds?",
            BmiSummary => "Thanks. We'll use your height and weight to calculate your BMI.",
            WeightLossMotivation => "What motivates you to lose weight? (comma separated)",
            PriorTreatment => "Have you used a weight-loss medication before? (yes/no)",
            PriorTreatmentDetails => "Which medications have you used? (comma separated)",
            TreatmentIntroduction => {
                "No problem. Your provider will walk you through how treatment works."
            }
            MedicationPreference => "Do you have a preferred medication? (yes/no)",
            PreferredMedication => "Which medication would you prefer?",
            ProviderRecommendation => "Your provider will recommend the best option for you.",
            MedicalConditions => "Do you have any of these conditions? (comma separated)",
            CurrentMedications => "List any medications you currently take.",
            Allergies => "List any allergies.",
            PregnancyStatus => "Are you pregnant, breastfeeding, or planning pregnancy?",
            EatingDisorderHistory => "Have you ever been diagnosed with an eating disorder? (yes/no)",
            ThyroidCancerHistory => {
                "Do you or a family member have a history of medullary thyroid cancer? (yes/no)"
            }
            PancreatitisHistory => "Have you ever had pancreatitis? (yes/no)",
            ActivityLevel => "How active are you on a typical week?",
            SleepHours => "How many hours do you sleep on a typical night?",
            AlcoholUse => "How often do you drink alcohol?",
            SmokingStatus => "Do you smoke or vape?",
            DietaryPreferences => "Any dietary preferences? (comma separated)",
            StressLevel => "How would you rate your stress level?",
            AccountCreation => "Create your account to save your answers.",
            ContactPhone => "What is the best phone number to reach you?",
            ShippingAddress => "Where should we ship your medication?",
            TelehealthConsent => "Do you consent to receive care via telehealth? (yes/no)",
            Review => "Please review your answers before submitting.",
            Complete => "All done! Your care team will review your intake shortly.",
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::START
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
