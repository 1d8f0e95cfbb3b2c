//! Progress percentage from a step's position in the canonical ordering.

use super::step::Step;

/// Maps steps to a 0–100 completion percentage.
#[derive(Debug, Clone)]
pub struct ProgressCalculator {
    ordering: Vec<Step>,
}

impl ProgressCalculator {
    /// Use a custom ordering. Steps missing from it report 0.
    pub fn new(ordering: Vec<Step>) -> Self {
        Self { ordering }
    }

    pub fn progress(&self, step: Step) -> u8 {
        let Some(index) = self.ordering.iter().position(|s| *s == step) else {
            tracing::warn!(step = %step, "Step missing from canonical ordering");
            return 0;
        };
        let last = self.ordering.len().saturating_sub(1);
        if last == 0 {
            return 100;
        }
        // Integer round-half-up of index / last * 100.
        ((index * 100 + last / 2) / last) as u8
    }
}

impl Default for ProgressCalculator {
    fn default() -> Self {
        Self::new(Step::ALL.to_vec())
    }
}
