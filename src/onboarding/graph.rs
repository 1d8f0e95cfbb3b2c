//! Step graph: the transition table of the intake flow.
//!
//! Every step has exactly one [`Edge`]. Routing is a pure function of
//! `(step, input)`; anything the table does not cover is an error, never a
//! jump to the terminal step.

use std::collections::{HashSet, VecDeque};

use crate::error::TransitionError;

use super::answer::{AnswerValue, StepInput};
use super::step::Step;

/// Outgoing edge of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Unconditional successor.
    Linear(Step),
    /// Successor chosen by a yes/no answer.
    Branch { yes: Step, no: Step },
    /// No successor.
    Terminal,
}

/// The intake transition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepGraph;

impl StepGraph {
    pub fn new() -> Self {
        Self
    }

    pub fn edge(&self, step: Step) -> Edge {
        use Step::*;
        match step {
            Welcome => Edge::Linear(ResidenceState),
            ResidenceState => Edge::Linear(DateOfBirth),
            DateOfBirth => Edge::Linear(BiologicalSex),
            BiologicalSex => Edge::Linear(Height),
            Height => Edge::Linear(Weight),
            Weight => Edge::Linear(GoalWeight),
            GoalWeight => Edge::Linear(BmiSummary),
            BmiSummary => Edge::Linear(WeightLossMotivation),
            WeightLossMotivation => Edge::Linear(PriorTreatment),
            PriorTreatment => Edge::Branch {
                yes: PriorTreatmentDetails,
                no: TreatmentIntroduction,
            },
            PriorTreatmentDetails | TreatmentIntroduction => Edge::Linear(MedicationPreference),
            MedicationPreference => Edge::Branch {
                yes: PreferredMedication,
                no: ProviderRecommendation,
            },
            PreferredMedication | ProviderRecommendation => Edge::Linear(MedicalConditions),
            MedicalConditions => Edge::Linear(CurrentMedications),
            CurrentMedications => Edge::Linear(Allergies),
            Allergies => Edge::Linear(PregnancyStatus),
            PregnancyStatus => Edge::Linear(EatingDisorderHistory),
            EatingDisorderHistory => Edge::Linear(ThyroidCancerHistory),
            ThyroidCancerHistory => Edge::Linear(PancreatitisHistory),
            PancreatitisHistory => Edge::Linear(ActivityLevel),
            ActivityLevel => Edge::Linear(SleepHours),
            SleepHours => Edge::Linear(AlcoholUse),
            AlcoholUse => Edge::Linear(SmokingStatus),
            SmokingStatus => Edge::Linear(DietaryPreferences),
            DietaryPreferences => Edge::Linear(StressLevel),
            StressLevel => Edge::Linear(AccountCreation),
            AccountCreation => Edge::Linear(ContactPhone),
            ContactPhone => Edge::Linear(ShippingAddress),
            ShippingAddress => Edge::Linear(TelehealthConsent),
            TelehealthConsent => Edge::Linear(Review),
            Review => Edge::Linear(Complete),
            Complete => Edge::Terminal,
        }
    }

    /// Resolve the successor of `step` for the (normalized) input.
    pub fn next(&self, step: Step, input: &StepInput) -> Result<Step, TransitionError> {
        match self.edge(step) {
            Edge::Linear(next) => Ok(next),
            Edge::Branch { yes, no } => match branch_choice(input) {
                Some(true) => Ok(yes),
                Some(false) => Ok(no),
                None => Err(TransitionError::UnexpectedInput {
                    step,
                    input: describe(input),
                }),
            },
            Edge::Terminal => Err(TransitionError::Terminal { step }),
        }
    }

    pub fn successors(&self, step: Step) -> Vec<Step> {
        match self.edge(step) {
            Edge::Linear(next) => vec![next],
            Edge::Branch { yes, no } => vec![yes, no],
            Edge::Terminal => Vec::new(),
        }
    }

    /// Steps with an edge into `step`.
    pub fn predecessors(&self, step: Step) -> Vec<Step> {
        Step::ALL
            .into_iter()
            .filter(|from| self.successors(*from).contains(&step))
            .collect()
    }

    pub fn is_branch_point(&self, step: Step) -> bool {
        matches!(self.edge(step), Edge::Branch { .. })
    }

    /// Check the table is a DAG rooted at the start step in which every step
    /// is reachable and every step can reach the terminal step.
    pub fn validate(&self) -> Result<(), String> {
        for step in Step::ALL {
            for next in self.successors(step) {
                if next.index() <= step.index() {
                    return Err(format!("edge {step} -> {next} points backwards"));
                }
            }
            if !step.is_terminal() && self.successors(step).is_empty() {
                return Err(format!("{step} is a dead end"));
            }
        }

        let reachable = self.reachable_from(Step::START);
        if let Some(orphan) = Step::ALL.into_iter().find(|s| !reachable.contains(s)) {
            return Err(format!("{orphan} is unreachable from {}", Step::START));
        }
        Ok(())
    }

    fn reachable_from(&self, start: Step) -> HashSet<Step> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(step) = queue.pop_front() {
            for next in self.successors(step) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}

fn branch_choice(input: &StepInput) -> Option<bool> {
    match input {
        StepInput::Answer(AnswerValue::Bool(b)) => Some(*b),
        StepInput::Answer(AnswerValue::Text(s)) => match s.as_str() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn describe(input: &StepInput) -> String {
    match input {
        StepInput::Answer(value) => format!("{} {value}", value.type_name()),
        other => other.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes() -> StepInput {
        StepInput::Answer(AnswerValue::text("yes"))
    }

    fn no() -> StepInput {
        StepInput::Answer(AnswerValue::text("no"))
    }

    #[test]
    fn table_is_a_valid_dag() {
        StepGraph::new().validate().unwrap();
    }

    #[test]
    fn routing_is_deterministic() {
        let graph = StepGraph::new();
        for step in Step::ALL.into_iter().filter(|s| !s.is_terminal()) {
            for input in [StepInput::Continue, yes(), no()] {
                let first = graph.next(step, &input);
                for _ in 0..3 {
                    assert_eq!(graph.next(step, &input), first, "{step} routed differently");
                }
            }
        }
    }

    #[test]
    fn prior_treatment_branches() {
        let graph = StepGraph::new();
        assert_eq!(
            graph.next(Step::PriorTreatment, &yes()),
            Ok(Step::PriorTreatmentDetails)
        );
        assert_eq!(
            graph.next(Step::PriorTreatment, &no()),
            Ok(Step::TreatmentIntroduction)
        );
        assert_eq!(
            graph.next(Step::PriorTreatment, &StepInput::Answer(AnswerValue::Bool(true))),
            Ok(Step::PriorTreatmentDetails)
        );
    }

    #[test]
    fn branches_reconverge() {
        let graph = StepGraph::new();
        for branch in [Step::PriorTreatment, Step::MedicationPreference] {
            let a = graph.next(branch, &yes()).unwrap();
            let b = graph.next(branch, &no()).unwrap();
            assert_ne!(a, b);
            assert_eq!(
                graph.next(a, &StepInput::Continue),
                graph.next(b, &StepInput::Continue),
                "{branch} arms should rejoin"
            );
        }
    }

    #[test]
    fn unexpected_branch_input_is_an_error() {
        let graph = StepGraph::new();
        let err = graph
            .next(Step::MedicationPreference, &StepInput::Answer(AnswerValue::text("")))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::UnexpectedInput {
                step: Step::MedicationPreference,
                ..
            }
        ));
        assert!(graph.next(Step::PriorTreatment, &StepInput::Continue).is_err());
    }

    #[test]
    fn terminal_has_no_successor() {
        let graph = StepGraph::new();
        assert_eq!(
            graph.next(Step::Complete, &StepInput::Continue),
            Err(TransitionError::Terminal {
                step: Step::Complete
            })
        );
        assert!(graph.successors(Step::Complete).is_empty());
    }

    #[test]
    fn predecessors_of_reconvergence_step() {
        let graph = StepGraph::new();
        assert_eq!(
            graph.predecessors(Step::MedicationPreference),
            vec![Step::PriorTreatmentDetails, Step::TreatmentIntroduction]
        );
        assert!(graph.predecessors(Step::START).is_empty());
        assert_eq!(graph.predecessors(Step::Complete), vec![Step::Review]);
    }

    #[test]
    fn exactly_two_branch_points() {
        let graph = StepGraph::new();
        let branches: Vec<_> = Step::ALL
            .into_iter()
            .filter(|s| graph.is_branch_point(*s))
            .collect();
        assert_eq!(branches, vec![Step::PriorTreatment, Step::MedicationPreference]);
    }
}
