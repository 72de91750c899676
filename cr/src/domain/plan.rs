//! Plan and PlanStep - the structured checklist a session may carry

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One checklist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique within the owning plan only
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            done: false,
        }
    }
}

/// A titled, ordered checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(title: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            title: title.into(),
            steps,
        }
    }

    /// Canonical form for an ingested plan
    ///
    /// Every step starts not done. The first occurrence of each non-empty id
    /// is kept as is. Empty and repeated ids are then replaced by the step's
    /// 1-based position, with a `-N` suffix while that id is already in use.
    pub fn normalized(mut self) -> Self {
        debug!(title = %self.title, step_count = self.steps.len(), "Plan::normalized: called");
        let mut taken: HashSet<String> = HashSet::with_capacity(self.steps.len());

        // Reserve explicit ids first so a back-filled id never displaces one
        let keeps: Vec<bool> = self
            .steps
            .iter()
            .map(|step| !step.id.is_empty() && taken.insert(step.id.clone()))
            .collect();

        for (idx, (step, keep)) in self.steps.iter_mut().zip(keeps).enumerate() {
            step.done = false;
            if keep {
                continue;
            }

            let position = (idx + 1).to_string();
            let mut candidate = position.clone();
            let mut suffix = 2;
            while taken.contains(&candidate) {
                candidate = format!("{position}-{suffix}");
                suffix += 1;
            }

            taken.insert(candidate.clone());
            step.id = candidate;
        }

        self
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Set `done` on the step with `id`; returns false when no step matches
    pub fn set_step_done(&mut self, id: &str, done: bool) -> bool {
        match self.steps.iter_mut().find(|s| s.id == id) {
            Some(step) => {
                step.done = done;
                true
            }
            None => {
                debug!(%id, "Plan::set_step_done: no matching step");
                false
            }
        }
    }

    pub fn completed(&self) -> usize {
        self.steps.iter().filter(|s| s.done).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, text: &str, done: bool) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            text: text.to_string(),
            done,
        }
    }

    #[test]
    fn test_normalized_forces_not_done() {
        let plan = Plan::new("T", vec![step("a", "x", true), step("b", "y", false)]).normalized();
        assert!(plan.steps.iter().all(|s| !s.done));
        assert_eq!(plan.steps[0].id, "a");
        assert_eq!(plan.steps[1].id, "b");
    }

    #[test]
    fn test_normalized_backfills_positional_ids() {
        let plan = Plan::new("T", vec![step("", "x", false), step("keep", "y", false), step("", "z", false)]).normalized();
        let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "keep", "3"]);
    }

    #[test]
    fn test_normalized_resolves_duplicates() {
        // Step 3 repeats "a"; its positional id "3" is then taken by an explicit id
        let plan = Plan::new(
            "T",
            vec![
                step("a", "first", false),
                step("3", "second", false),
                step("a", "third", false),
                step("", "fourth", false),
            ],
        )
        .normalized();

        let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "3", "3-2", "4"]);
    }

    #[test]
    fn test_normalized_keeps_explicit_id_after_missing_one() {
        let plan = Plan::new("T", vec![step("", "a", false), step("1", "b", false)]).normalized();
        let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1-2", "1"]);
    }

    #[test]
    fn test_set_step_done_only_touches_match() {
        let mut plan = Plan::new("T", vec![step("1", "a", false), step("2", "b", false)]);

        assert!(plan.set_step_done("2", true));
        assert!(!plan.steps[0].done);
        assert!(plan.steps[1].done);
        assert_eq!(plan.completed(), 1);

        let before = plan.clone();
        assert!(!plan.set_step_done("missing", true));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_deserialize_defaults() {
        let plan: Plan = serde_json::from_str(r#"{"title":"T","steps":[{"text":"a"}]}"#).unwrap();
        assert_eq!(plan.steps[0].id, "");
        assert!(!plan.steps[0].done);

        let empty: Plan = serde_json::from_str(r#"{"title":"Empty"}"#).unwrap();
        assert!(empty.steps.is_empty());
    }
}
