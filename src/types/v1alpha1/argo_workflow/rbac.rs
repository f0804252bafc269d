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

use super::config::labels_contained;
use super::{ArgoWorkFlow, INSTANCE_LABEL, MANAGED_BY, MANAGED_BY_LABEL};
use k8s_openapi::Resource as _;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::reflector::ObjectRef;

/// Records which namespace a cluster-scoped binding belongs to. Owner
/// references cannot point from a cluster-scoped object to a namespaced one.
pub const OWNER_NAMESPACE_LABEL: &str = "stack.zncdata.net/owner-namespace";

/// Maps a ClusterRoleBinding back to the ArgoWorkFlow it was created for,
/// using the labels `new_cluster_role_binding` sets.
pub fn binding_owner(binding: &rbacv1::ClusterRoleBinding) -> Option<ObjectRef<ArgoWorkFlow>> {
    let labels = binding.metadata.labels.as_ref()?;
    if labels.get(MANAGED_BY_LABEL).map(String::as_str) != Some(MANAGED_BY) {
        return None;
    }

    let namespace = labels.get(OWNER_NAMESPACE_LABEL)?;
    let name = labels.get(INSTANCE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}

impl ArgoWorkFlow {
    pub fn new_service_account(&self) -> corev1::ServiceAccount {
        corev1::ServiceAccount {
            metadata: self.child_metadata(self.service_account_name()),
            ..Default::default()
        }
    }

    pub fn service_account_needs_update(&self, existing: &corev1::ServiceAccount) -> bool {
        !labels_contained(&Some(self.common_labels()), &existing.metadata.labels)
    }

    pub fn new_cluster_role_binding(&self) -> rbacv1::ClusterRoleBinding {
        let mut labels = self.common_labels();
        labels.insert(
            OWNER_NAMESPACE_LABEL.to_owned(),
            self.namespace().unwrap_or_default(),
        );

        rbacv1::ClusterRoleBinding {
            metadata: metav1::ObjectMeta {
                name: Some(self.cluster_role_binding_name()),
                labels: Some(labels),
                ..Default::default()
            },
            subjects: Some(vec![rbacv1::Subject {
                kind: corev1::ServiceAccount::KIND.to_owned(),
                namespace: self.namespace().ok(),
                name: self.service_account_name(),
                ..Default::default()
            }]),
            role_ref: rbacv1::RoleRef {
                api_group: rbacv1::ClusterRole::GROUP.to_owned(),
                kind: rbacv1::ClusterRole::KIND.to_owned(),
                name: self.cluster_role(),
            },
        }
    }

    /// `roleRef` cannot be changed in place, the binding has to be recreated.
    pub fn cluster_role_binding_needs_recreate(
        &self,
        existing: &rbacv1::ClusterRoleBinding,
    ) -> bool {
        existing.role_ref != self.new_cluster_role_binding().role_ref
    }

    pub fn cluster_role_binding_needs_update(&self, existing: &rbacv1::ClusterRoleBinding) -> bool {
        let desired = self.new_cluster_role_binding();

        existing.subjects != desired.subjects
            || !labels_contained(&desired.metadata.labels, &existing.metadata.labels)
    }
}
