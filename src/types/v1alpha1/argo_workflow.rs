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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::controller::ControllerConfig;
use crate::types::v1alpha1::image::ImageConfig;
use crate::types::v1alpha1::service::ServiceConfig;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;

mod conditions;
mod config;
mod rbac;
mod services;
mod workloads;

pub use config::CONFIG_HASH_ANNOTATION;
pub use rbac::{OWNER_NAMESPACE_LABEL, binding_owner};

pub const FINALIZER: &str = "stack.zncdata.net/argoworkflow-cleanup";
pub const DEFAULT_CLUSTER_ROLE: &str = "argo-cluster-role";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

const APP_NAME: &str = "argo-workflow";
const COMPONENT: &str = "workflow-controller";
pub const MANAGED_BY: &str = "argo-workflow-operator";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "stack.zncdata.net",
    version = "v1alpha1",
    kind = "ArgoWorkFlow",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "awf",
    plural = "argoworkflows",
    singular = "argoworkflow",
    printcolumn = r#"{"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image.tag"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ArgoWorkFlowSpec {
    #[serde(default)]
    pub image: ImageConfig,

    /// Image used for workflow pod executors, defaults to argoexec with the controller tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_image: Option<String>,

    #[serde(default = "default_replicas")]
    #[x_kube(validation = Rule::new("self >= 0").message("replicas must not be negative"))]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Watch only the namespace the controller runs in
    #[serde(default)]
    pub namespaced: bool,

    /// ClusterRole granted to the controller's ServiceAccount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_role: Option<String>,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<corev1::EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<corev1::Toleration>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<corev1::Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<corev1::PodSecurityContext>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<corev1::LocalObjectReference>,
}

fn default_replicas() -> i32 {
    1
}

impl ArgoWorkFlow {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// `metadata.generation`, 0 when the API server has not assigned one yet
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// a new owner reference for the workflow engine
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Metadata shared by every namespaced child object
    fn child_metadata(&self, name: String) -> metav1::ObjectMeta {
        metav1::ObjectMeta {
            name: Some(name),
            namespace: self.namespace().ok(),
            owner_references: Some(vec![self.new_owner_ref()]),
            labels: Some(self.common_labels()),
            ..Default::default()
        }
    }

    /// Kubernetes recommended labels
    pub fn common_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(
            "app.kubernetes.io/component".to_owned(),
            COMPONENT.to_owned(),
        );
        labels.insert(MANAGED_BY_LABEL.to_owned(), MANAGED_BY.to_owned());
        labels
    }

    /// Labels selecting the workflow-controller pods, must stay stable across updates
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        [
            ("app.kubernetes.io/name".to_owned(), APP_NAME.to_owned()),
            (INSTANCE_LABEL.to_owned(), self.name()),
        ]
        .into_iter()
        .collect()
    }

    pub fn deployment_name(&self) -> String {
        format!("{}-workflow-controller", self.name())
    }

    pub fn service_name(&self) -> String {
        format!("{}-workflow-controller-metrics", self.name())
    }

    pub fn service_account_name(&self) -> String {
        format!("{}-argo-workflow", self.name())
    }

    /// ClusterRoleBindings are cluster scoped, so the namespace is part of the name
    pub fn cluster_role_binding_name(&self) -> String {
        format!(
            "{}-{}-argo-workflow",
            self.namespace().unwrap_or_default(),
            self.name()
        )
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-workflow-controller-configmap", self.name())
    }

    pub fn cluster_role(&self) -> String {
        self.spec
            .cluster_role
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTER_ROLE.to_owned())
    }

    pub fn executor_image(&self) -> String {
        self.spec
            .executor_image
            .clone()
            .unwrap_or_else(|| self.spec.image.default_executor_reference())
    }

    pub fn log_level(&self) -> String {
        self.spec
            .log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults_from_empty_object() {
        let spec: ArgoWorkFlowSpec = serde_json::from_str("{}").expect("empty spec is valid");
        assert_eq!(spec.replicas, 1);
        assert!(!spec.namespaced);
        assert_eq!(spec.service.port, 9090);
        assert!(spec.cluster_role.is_none());
    }

    #[test]
    fn test_child_names() {
        let workflow = crate::tests::create_test_workflow("wf-a", "ns1", 1);

        assert_eq!(workflow.deployment_name(), "wf-a-workflow-controller");
        assert_eq!(workflow.service_name(), "wf-a-workflow-controller-metrics");
        assert_eq!(workflow.service_account_name(), "wf-a-argo-workflow");
        assert_eq!(workflow.cluster_role_binding_name(), "ns1-wf-a-argo-workflow");
        assert_eq!(
            workflow.config_map_name(),
            "wf-a-workflow-controller-configmap"
        );
        assert_eq!(workflow.cluster_role(), DEFAULT_CLUSTER_ROLE);
        assert_eq!(workflow.executor_image(), "quay.io/argoproj/argoexec:v3.4.8");
    }

    #[test]
    fn test_owner_ref_points_at_workflow() {
        let workflow = crate::tests::create_test_workflow("wf-a", "ns1", 1);
        let owner = workflow.new_owner_ref();

        assert_eq!(owner.kind, "ArgoWorkFlow");
        assert_eq!(owner.api_version, "stack.zncdata.net/v1alpha1");
        assert_eq!(owner.name, "wf-a");
        assert_eq!(owner.uid, "wf-a-uid");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_selector_labels_are_subset_of_common_labels() {
        let workflow = crate::tests::create_test_workflow("wf-a", "ns1", 1);
        let common = workflow.common_labels();

        for (k, v) in workflow.selector_labels() {
            assert_eq!(common.get(&k), Some(&v));
        }
        assert_eq!(
            common.get("app.kubernetes.io/managed-by").map(String::as_str),
            Some("argo-workflow-operator")
        );
    }

    #[test]
    fn test_missing_namespace_is_an_error() {
        let mut workflow = crate::tests::create_test_workflow("wf-a", "ns1", 1);
        workflow.metadata.namespace = None;
        assert!(matches!(
            workflow.namespace(),
            Err(types::error::Error::NoNamespace)
        ));
    }
}
