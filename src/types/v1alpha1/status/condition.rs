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

//! Generation-stamped status conditions.
//!
//! Conditions are stored on the wire as a list (the shape `kubectl` and other
//! tooling expect) but handled in memory as a map keyed by condition type,
//! so each type appears at most once.

use chrono::{SecondsFormat, Utc};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Clone, Copy, Debug, Display, AsRefStr, PartialEq, Eq)]
pub enum ConditionType {
    /// The operator is working towards the current generation
    Progressing,
    /// Every child resource has been reconciled for the current generation
    Available,
}

#[derive(Clone, Copy, Debug, Display, AsRefStr, PartialEq, Eq)]
pub enum ConditionReason {
    Preparing,
    Running,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// RFC3339 time of the last status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: Some(observed_generation),
            last_transition_time: None,
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.get(type_.as_ref())
    }

    /// Inserts or replaces the condition of the same type.
    ///
    /// `lastTransitionTime` only moves when the status value changes. Returns
    /// whether the stored conditions changed.
    pub fn set(&mut self, mut condition: Condition) -> bool {
        match self.0.get_mut(&condition.type_) {
            Some(existing) => {
                if existing.status != condition.status {
                    existing.status = condition.status;
                    existing.last_transition_time =
                        condition.last_transition_time.or_else(|| Some(now()));
                } else if existing.reason == condition.reason
                    && existing.message == condition.message
                    && existing.observed_generation == condition.observed_generation
                {
                    return false;
                }

                existing.reason = condition.reason;
                existing.message = condition.message;
                existing.observed_generation = condition.observed_generation;
                true
            }
            None => {
                if condition.last_transition_time.is_none() {
                    condition.last_transition_time = Some(now());
                }
                self.0.insert(condition.type_.clone(), condition);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Conditions(
            conditions
                .into_iter()
                .map(|c| (c.type_.clone(), c))
                .collect(),
        )
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

impl JsonSchema for Conditions {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Conditions")
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        Vec::<Condition>::json_schema(generator)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn available(status: ConditionStatus, generation: i64) -> Condition {
        Condition::new(
            ConditionType::Available,
            status,
            ConditionReason::Running,
            "ArgoWorkFlow is running",
            generation,
        )
    }

    #[test]
    fn test_set_inserts_and_stamps_transition_time() {
        let mut conditions = Conditions::default();
        assert!(conditions.set(available(ConditionStatus::True, 1)));

        let stored = conditions.get(ConditionType::Available).unwrap();
        assert_eq!(stored.status, ConditionStatus::True);
        assert!(stored.last_transition_time.is_some());
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_set_same_condition_is_noop() {
        let mut conditions = Conditions::default();
        conditions.set(available(ConditionStatus::True, 1));
        let before = conditions.clone();

        assert!(!conditions.set(available(ConditionStatus::True, 1)));
        assert_eq!(conditions, before);
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut conditions = Conditions::default();
        let mut first = available(ConditionStatus::True, 1);
        first.last_transition_time = Some("2024-01-01T00:00:00Z".to_string());
        conditions.set(first);

        assert!(conditions.set(available(ConditionStatus::True, 2)));
        let stored = conditions.get(ConditionType::Available).unwrap();
        assert_eq!(stored.observed_generation, Some(2));
        assert_eq!(
            stored.last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_transition_time_moves_when_status_changes() {
        let mut conditions = Conditions::default();
        let mut first = available(ConditionStatus::False, 1);
        first.last_transition_time = Some("2024-01-01T00:00:00Z".to_string());
        conditions.set(first);

        assert!(conditions.set(available(ConditionStatus::True, 1)));
        let stored = conditions.get(ConditionType::Available).unwrap();
        assert_ne!(
            stored.last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_wire_format_is_a_list_keyed_by_type() {
        let json = serde_json::json!([
            {"type": "Progressing", "status": "True", "reason": "Preparing", "message": "", "observedGeneration": 1},
            {"type": "Available", "status": "False", "reason": "Preparing", "message": "", "observedGeneration": 1},
            {"type": "Available", "status": "True", "reason": "Running", "message": "", "observedGeneration": 1}
        ]);

        let conditions: Conditions = serde_json::from_value(json).unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(
            conditions.get(ConditionType::Available).unwrap().status,
            ConditionStatus::True
        );

        let back = serde_json::to_value(&conditions).unwrap();
        let types: Vec<_> = back
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["Available", "Progressing"]);
    }
}
