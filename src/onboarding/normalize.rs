//! Answer normalization: a registry from question key to a closed set of
//! strategies.
//!
//! Normalization never fails: malformed input collapses to a neutral value
//! (empty string, empty list, or `Null`). Every strategy is idempotent.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};

use super::answer::{AnswerMap, AnswerValue, keys};

/// How a question's raw value is coerced before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Single-select or free text: trimmed string, never null.
    Text,
    /// Multi-select: deduplicated non-empty strings.
    TextList,
    /// Yes/no question: `"yes"`, `"no"`, or `""`.
    YesNo,
    /// Calendar date as `YYYY-MM-DD`, or `Null`.
    IsoDate,
    /// Positive physical measurement, or `Null`.
    Measurement,
    /// Value computed by the engine, rounded to one decimal.
    Derived,
}

impl Strategy {
    pub fn apply(&self, value: &AnswerValue) -> AnswerValue {
        match self {
            Self::Text => AnswerValue::Text(to_text(value)),
            Self::TextList => AnswerValue::List(to_list(value)),
            Self::YesNo => AnswerValue::text(to_yes_no(value)),
            Self::IsoDate => to_iso_date(value).map_or(AnswerValue::Null, AnswerValue::Text),
            Self::Measurement => to_number(value)
                .filter(|n| *n > 0.0)
                .map_or(AnswerValue::Null, AnswerValue::Number),
            Self::Derived => to_number(value)
                .map(round_one_decimal)
                .map_or(AnswerValue::Null, AnswerValue::Number),
        }
    }
}

/// Registry mapping question keys to their normalization strategy.
///
/// Keys without a registered strategy pass through unchanged.
#[derive(Debug, Clone)]
pub struct NormalizerRegistry {
    strategies: HashMap<String, Strategy>,
}

impl NormalizerRegistry {
    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy for a key. Returns the previous one.
    pub fn register(&mut self, key: impl Into<String>, strategy: Strategy) -> Option<Strategy> {
        self.strategies.insert(key.into(), strategy)
    }

    pub fn with(mut self, key: impl Into<String>, strategy: Strategy) -> Self {
        self.register(key, strategy);
        self
    }

    pub fn strategy(&self, key: &str) -> Option<Strategy> {
        self.strategies.get(key).copied()
    }

    pub fn normalize(&self, key: &str, value: &AnswerValue) -> AnswerValue {
        match self.strategy(key) {
            Some(strategy) => strategy.apply(value),
            None => {
                tracing::debug!(key, "No normalizer registered, passing value through");
                value.clone()
            }
        }
    }
}

impl Default for NormalizerRegistry {
    /// The intake questionnaire's registry.
    fn default() -> Self {
        use Strategy::*;
        let table: [(&str, Strategy); 30] = [
            (keys::RESIDENCE_STATE, Text),
            (keys::DATE_OF_BIRTH, IsoDate),
            (keys::BIOLOGICAL_SEX, Text),
            (keys::HEIGHT_INCHES, Measurement),
            (keys::WEIGHT_LBS, Measurement),
            (keys::GOAL_WEIGHT_LBS, Measurement),
            (keys::WEIGHT_LOSS_MOTIVATION, TextList),
            (keys::PREVIOUSLY_USED_TREATMENT, YesNo),
            (keys::PRIOR_TREATMENTS, TextList),
            (keys::HAS_MEDICATION_PREFERENCE, YesNo),
            (keys::PREFERRED_MEDICATION, Text),
            (keys::MEDICAL_CONDITIONS, TextList),
            (keys::CURRENT_MEDICATIONS, Text),
            (keys::ALLERGIES, Text),
            (keys::PREGNANCY_STATUS, Text),
            (keys::EATING_DISORDER_HISTORY, YesNo),
            (keys::THYROID_CANCER_HISTORY, YesNo),
            (keys::PANCREATITIS_HISTORY, YesNo),
            (keys::ACTIVITY_LEVEL, Text),
            (keys::SLEEP_HOURS, Measurement),
            (keys::ALCOHOL_USE, Text),
            (keys::SMOKING_STATUS, Text),
            (keys::DIETARY_PREFERENCES, TextList),
            (keys::STRESS_LEVEL, Text),
            (keys::PHONE, Text),
            (keys::SHIPPING_ADDRESS, Text),
            (keys::TELEHEALTH_CONSENT, YesNo),
            (keys::EMAIL, Text),
            (keys::FIRST_NAME, Text),
            (keys::LAST_NAME, Text),
        ];
        let mut registry = Self::empty();
        for (key, strategy) in table {
            registry.register(key, strategy);
        }
        registry.with(keys::BMI, Derived)
    }
}

/// Body-mass index from the height (inches) and weight (pounds) answers.
pub fn derive_bmi(answers: &AnswerMap) -> Option<f64> {
    let height = answers.get(keys::HEIGHT_INCHES)?.as_f64()?;
    let weight = answers.get(keys::WEIGHT_LBS)?.as_f64()?;
    if height <= 0.0 || weight <= 0.0 {
        return None;
    }
    Some(round_one_decimal(703.0 * weight / (height * height)))
}

fn to_text(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Null => String::new(),
        AnswerValue::Bool(b) => b.to_string(),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::Text(s) => s.trim().to_string(),
        AnswerValue::List(_) => to_list(value).join(", "),
    }
}

fn to_list(value: &AnswerValue) -> Vec<String> {
    let raw: Vec<String> = match value {
        AnswerValue::Null => Vec::new(),
        AnswerValue::Bool(b) => vec![b.to_string()],
        AnswerValue::Number(n) => vec![n.to_string()],
        AnswerValue::Text(s) => vec![s.clone()],
        AnswerValue::List(items) => items.clone(),
    };
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn to_yes_no(value: &AnswerValue) -> &'static str {
    match value {
        AnswerValue::Bool(true) => "yes",
        AnswerValue::Bool(false) => "no",
        AnswerValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" => "yes",
            "no" | "n" | "false" => "no",
            _ => "",
        },
        _ => "",
    }
}

fn to_iso_date(value: &AnswerValue) -> Option<String> {
    let raw = value.as_str()?.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn to_number(value: &AnswerValue) -> Option<f64> {
    let n = match value {
        AnswerValue::Number(n) => *n,
        AnswerValue::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn round_one_decimal(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<AnswerValue> {
        vec![
            AnswerValue::Null,
            AnswerValue::Bool(true),
            AnswerValue::Bool(false),
            AnswerValue::Number(0.0),
            AnswerValue::Number(-4.0),
            AnswerValue::Number(68.25),
            AnswerValue::Number(f64::NAN),
            AnswerValue::text(""),
            AnswerValue::text("  Texas "),
            AnswerValue::text("YES"),
            AnswerValue::text(" n "),
            AnswerValue::text("1990-02-28"),
            AnswerValue::text("02/28/1990"),
            AnswerValue::text("1990-02-28T10:00:00Z"),
            AnswerValue::text("1990-02-30"),
            AnswerValue::text("71.5"),
            AnswerValue::list(["a", " a", "", "b "]),
            AnswerValue::list(Vec::<String>::new()),
        ]
    }

    #[test]
    fn every_strategy_is_idempotent() {
        use Strategy::*;
        for strategy in [Text, TextList, YesNo, IsoDate, Measurement, Derived] {
            for raw in samples() {
                let once = strategy.apply(&raw);
                let twice = strategy.apply(&once);
                assert_eq!(once, twice, "{strategy:?} not idempotent for {raw:?}");
            }
        }
    }

    #[test]
    fn registry_is_idempotent_for_every_registered_key() {
        let registry = NormalizerRegistry::default();
        for key in registry.strategies.keys() {
            for raw in samples() {
                let once = registry.normalize(key, &raw);
                assert_eq!(registry.normalize(key, &once), once, "{key} not idempotent");
            }
        }
    }

    #[test]
    fn text_trims_and_never_nulls() {
        assert_eq!(Strategy::Text.apply(&AnswerValue::Null), AnswerValue::text(""));
        assert_eq!(
            Strategy::Text.apply(&AnswerValue::text("  Texas ")),
            AnswerValue::text("Texas")
        );
        assert_eq!(
            Strategy::Text.apply(&AnswerValue::list([" a", "b", "a"])),
            AnswerValue::text("a, b")
        );
    }

    #[test]
    fn list_wraps_scalars_and_dedups() {
        assert_eq!(
            Strategy::TextList.apply(&AnswerValue::text("sleep")),
            AnswerValue::list(["sleep"])
        );
        assert_eq!(
            Strategy::TextList.apply(&AnswerValue::list(["energy", " energy ", "", "health"])),
            AnswerValue::list(["energy", "health"])
        );
        assert_eq!(
            Strategy::TextList.apply(&AnswerValue::text("   ")),
            AnswerValue::List(vec![])
        );
    }

    #[test]
    fn yes_no_variants() {
        assert_eq!(Strategy::YesNo.apply(&AnswerValue::Bool(true)), AnswerValue::text("yes"));
        assert_eq!(Strategy::YesNo.apply(&AnswerValue::text(" No")), AnswerValue::text("no"));
        assert_eq!(Strategy::YesNo.apply(&AnswerValue::text("maybe")), AnswerValue::text(""));
    }

    #[test]
    fn dates_normalize_to_iso_or_null() {
        let iso = AnswerValue::text("1990-02-28");
        assert_eq!(Strategy::IsoDate.apply(&AnswerValue::text("02/28/1990")), iso);
        assert_eq!(
            Strategy::IsoDate.apply(&AnswerValue::text("1990-02-28T23:00:00-05:00")),
            iso
        );
        assert_eq!(Strategy::IsoDate.apply(&AnswerValue::text("1990-02-30")), AnswerValue::Null);
        assert_eq!(Strategy::IsoDate.apply(&AnswerValue::text("soon")), AnswerValue::Null);
        assert_eq!(Strategy::IsoDate.apply(&AnswerValue::Number(1.0)), AnswerValue::Null);
    }

    #[test]
    fn measurements_must_be_positive() {
        assert_eq!(
            Strategy::Measurement.apply(&AnswerValue::text("180")),
            AnswerValue::Number(180.0)
        );
        assert_eq!(Strategy::Measurement.apply(&AnswerValue::Number(0.0)), AnswerValue::Null);
        assert_eq!(Strategy::Measurement.apply(&AnswerValue::text("tall")), AnswerValue::Null);
    }

    #[test]
    fn unregistered_keys_pass_through() {
        let registry = NormalizerRegistry::empty();
        let value = AnswerValue::text("  untouched ");
        assert_eq!(registry.normalize("mystery", &value), value);
    }

    #[test]
    fn registration_is_additive() {
        let mut registry = NormalizerRegistry::default();
        assert_eq!(registry.strategy("favorite_fruit"), None);
        assert_eq!(registry.register("favorite_fruit", Strategy::Text), None);
        assert_eq!(registry.strategy("favorite_fruit"), Some(Strategy::Text));
        assert_eq!(registry.strategy(keys::DATE_OF_BIRTH), Some(Strategy::IsoDate));
    }

    #[test]
    fn bmi_from_height_and_weight() {
        let mut answers = AnswerMap::new();
        answers.insert(keys::HEIGHT_INCHES.into(), AnswerValue::Number(70.0));
        answers.insert(keys::WEIGHT_LBS.into(), AnswerValue::Number(200.0));
        assert_eq!(derive_bmi(&answers), Some(28.7));

        answers.insert(keys::WEIGHT_LBS.into(), AnswerValue::Null);
        assert_eq!(derive_bmi(&answers), None);
    }
}
