// Copyright 2025 zncdata-labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::ArgoWorkFlow;
use crate::types::v1alpha1::status::condition::{
    Condition, ConditionReason, ConditionStatus, ConditionType,
};

impl ArgoWorkFlow {
    pub fn find_condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.status.as_ref()?.conditions.get(type_)
    }

    /// Sets a condition on the in-memory status, returns whether it changed.
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .set(condition)
    }

    /// True when the Progressing condition is missing or was written for an
    /// older generation of the spec.
    pub fn conditions_stale(&self) -> bool {
        match self.find_condition(ConditionType::Progressing) {
            Some(condition) => condition.observed_generation != Some(self.generation()),
            None => true,
        }
    }

    /// Drops every condition and starts the current generation over as
    /// Progressing.
    pub fn init_conditions(&mut self) {
        let generation = self.generation();
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .clear();

        self.set_condition(Condition::new(
            ConditionType::Progressing,
            ConditionStatus::True,
            ConditionReason::Preparing,
            "ArgoWorkFlow is preparing",
            generation,
        ));
        self.set_condition(Condition::new(
            ConditionType::Available,
            ConditionStatus::False,
            ConditionReason::Preparing,
            "ArgoWorkFlow is preparing",
            generation,
        ));
    }

    /// Marks the current generation as fully reconciled.
    pub fn set_available(&mut self) -> bool {
        let generation = self.generation();
        self.set_condition(Condition::new(
            ConditionType::Available,
            ConditionStatus::True,
            ConditionReason::Running,
            "ArgoWorkFlow is running",
            generation,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::create_test_workflow;

    #[test]
    fn test_missing_status_is_stale() {
        let workflow = create_test_workflow("wf-a", "ns1", 1);
        assert!(workflow.status.is_none());
        assert!(workflow.conditions_stale());
    }

    #[test]
    fn test_init_conditions_stamps_current_generation() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 3);
        workflow.init_conditions();

        assert!(!workflow.conditions_stale());
        let progressing = workflow
            .find_condition(ConditionType::Progressing)
            .unwrap();
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(progressing.reason, "Preparing");
        assert_eq!(progressing.observed_generation, Some(3));

        let available = workflow.find_condition(ConditionType::Available).unwrap();
        assert_eq!(available.status, ConditionStatus::False);
    }

    #[test]
    fn test_generation_bump_makes_conditions_stale() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 1);
        workflow.init_conditions();
        workflow.set_available();

        workflow.metadata.generation = Some(2);
        assert!(workflow.conditions_stale());

        workflow.init_conditions();
        assert_eq!(workflow.status.as_ref().unwrap().conditions.len(), 2);
        assert_eq!(
            workflow
                .find_condition(ConditionType::Available)
                .unwrap()
                .status,
            ConditionStatus::False
        );
    }

    #[test]
    fn test_set_available_twice_changes_once() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 1);
        workflow.init_conditions();

        assert!(workflow.set_available());
        assert!(!workflow.set_available());

        let available = workflow.find_condition(ConditionType::Available).unwrap();
        assert_eq!(available.status, ConditionStatus::True);
        assert_eq!(available.reason, "Running");
        assert_eq!(available.observed_generation, Some(1));
    }
}
