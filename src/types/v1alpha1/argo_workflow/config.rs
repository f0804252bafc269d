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
use k8s_openapi::api::core::v1 as corev1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Pod template annotation carrying the hash of the controller ConfigMap,
/// so a configuration change rolls the controller pods.
pub const CONFIG_HASH_ANNOTATION: &str = "stack.zncdata.net/config-hash";

impl ArgoWorkFlow {
    pub fn config_data(&self) -> BTreeMap<String, String> {
        self.spec.controller.to_config_data()
    }

    /// Hex SHA-256 over the sorted `key=value` lines of the ConfigMap data
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in self.config_data() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn new_config_map(&self) -> corev1::ConfigMap {
        corev1::ConfigMap {
            metadata: self.child_metadata(self.config_map_name()),
            data: Some(self.config_data()),
            ..Default::default()
        }
    }

    pub fn config_map_needs_update(&self, existing: &corev1::ConfigMap) -> bool {
        let desired = self.new_config_map();

        // an empty map and a missing one are the same to the API server
        existing.data.clone().unwrap_or_default() != desired.data.unwrap_or_default()
            || !labels_contained(&desired.metadata.labels, &existing.metadata.labels)
    }
}

/// Every desired label is present with the same value. Extra labels set by
/// other parties are tolerated.
pub(super) fn labels_contained(
    desired: &Option<BTreeMap<String, String>>,
    existing: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let existing = existing.as_ref();

    desired
        .iter()
        .all(|(k, v)| existing.and_then(|labels| labels.get(k)) == Some(v))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::tests::create_test_workflow;

    #[test]
    fn test_config_map_structure() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 1);
        workflow.spec.controller.parallelism = Some(5);

        let cm = workflow.new_config_map();
        assert_eq!(
            cm.metadata.name.as_deref(),
            Some("wf-a-workflow-controller-configmap")
        );
        assert_eq!(cm.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(cm.metadata.owner_references.unwrap()[0].name, "wf-a");
        assert_eq!(
            cm.data.unwrap().get("parallelism").map(String::as_str),
            Some("5")
        );
    }

    #[test]
    fn test_config_hash_tracks_data() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 1);
        let empty = workflow.config_hash();
        assert_eq!(empty.len(), 64);
        assert_eq!(empty, workflow.config_hash());

        workflow.spec.controller.instance_id = Some("team-a".to_string());
        assert_ne!(empty, workflow.config_hash());
    }

    #[test]
    fn test_config_map_drift() {
        let mut workflow = create_test_workflow("wf-a", "ns1", 1);
        let mut existing = workflow.new_config_map();
        assert!(!workflow.config_map_needs_update(&existing));

        // labels added by someone else are not drift
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("team".to_string(), "platform".to_string());
        assert!(!workflow.config_map_needs_update(&existing));

        workflow.spec.controller.namespace_parallelism = Some(3);
        assert!(workflow.config_map_needs_update(&existing));
    }
}
