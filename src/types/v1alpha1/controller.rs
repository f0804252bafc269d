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

//! Settings rendered into the workflow-controller ConfigMap.
//!
//! Keys follow the upstream `workflow-controller-configmap` format:
//! https://argo-workflows.readthedocs.io/en/latest/workflow-controller-configmap/

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Maximum number of workflows running at once across the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i32>,

    /// Maximum number of workflows running at once per namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_parallelism: Option<i32>,

    /// Restricts the controller to workflows labelled with this instance id
    #[serde(default, rename = "instanceID", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Additional configmap keys, copied verbatim. Entries here win over the
    /// typed fields above.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ControllerConfig {
    pub fn to_config_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();

        if let Some(parallelism) = self.parallelism {
            data.insert("parallelism".to_owned(), parallelism.to_string());
        }

        if let Some(parallelism) = self.namespace_parallelism {
            data.insert("namespaceParallelism".to_owned(), parallelism.to_string());
        }

        if let Some(ref instance_id) = self.instance_id {
            data.insert("instanceID".to_owned(), instance_id.clone());
        }

        data.extend(self.extra.clone());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_renders_no_keys() {
        assert!(ControllerConfig::default().to_config_data().is_empty());
    }

    #[test]
    fn test_typed_fields_and_extra_keys() {
        let config = ControllerConfig {
            parallelism: Some(10),
            namespace_parallelism: Some(2),
            instance_id: Some("team-a".to_string()),
            extra: [
                ("parallelism".to_string(), "20".to_string()),
                ("nodeEvents".to_string(), "enabled: false".to_string()),
            ]
            .into_iter()
            .collect(),
        };

        let data = config.to_config_data();
        assert_eq!(data.get("parallelism"), Some(&"20".to_string()));
        assert_eq!(data.get("namespaceParallelism"), Some(&"2".to_string()));
        assert_eq!(data.get("instanceID"), Some(&"team-a".to_string()));
        assert_eq!(data.get("nodeEvents"), Some(&"enabled: false".to_string()));
        assert_eq!(data.len(), 4);
    }
}
