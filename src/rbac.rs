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

//! ClusterRole the operator itself runs with.
//!
//! Besides what it manages directly, the operator has to hold every
//! permission it grants to the workflow controller, or the API server
//! refuses to create the binding.

use crate::context::FIELD_MANAGER;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

const ALL: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> rbacv1::PolicyRule {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    rbacv1::PolicyRule {
        api_groups: Some(owned(groups)),
        resources: Some(owned(resources)),
        verbs: owned(verbs),
        ..Default::default()
    }
}

pub fn operator_cluster_role() -> rbacv1::ClusterRole {
    let mut leader_lease = rule(&["coordination.k8s.io"], &["leases"], ALL);
    leader_lease.resource_names = Some(vec![
        "workflow-controller".to_string(),
        "workflow-controller-lease".to_string(),
    ]);

    rbacv1::ClusterRole {
        metadata: metav1::ObjectMeta {
            name: Some(format!("{FIELD_MANAGER}-manager-role")),
            ..Default::default()
        },
        rules: Some(vec![
            rule(&["stack.zncdata.net"], &["argoworkflows"], ALL),
            rule(
                &["stack.zncdata.net"],
                &["argoworkflows/status"],
                &["get", "update", "patch"],
            ),
            rule(&["stack.zncdata.net"], &["argoworkflows/finalizers"], &["update"]),
            rule(&["apps"], &["deployments"], ALL),
            rule(&[""], &["configmaps", "services", "serviceaccounts"], ALL),
            rule(&[""], &["pods", "pods/exec"], ALL),
            rule(
                &[""],
                &["persistentvolumeclaims", "persistentvolumeclaims/finalizers"],
                &["get", "create", "update", "delete"],
            ),
            rule(&[""], &["events"], &["create", "patch"]),
            rule(&["events.k8s.io"], &["events"], &["create", "patch"]),
            rule(&["rbac.authorization.k8s.io"], &["clusterrolebindings"], ALL),
            rule(
                &["argoproj.io"],
                &[
                    "workflows",
                    "workflows/finalizers",
                    "workflowtasksets",
                    "workflowtasksets/finalizers",
                    "workflowartifactgctasks",
                    "cronworkflows",
                    "cronworkflows/finalizers",
                ],
                ALL,
            ),
            rule(
                &["argoproj.io"],
                &["workflowtemplates", "workflowtemplates/finalizers"],
                &["get", "list", "watch"],
            ),
            rule(
                &["argoproj.io"],
                &["workflowtaskresults"],
                &["list", "watch", "deletecollection"],
            ),
            rule(&["policy"], &["poddisruptionbudgets"], &["create", "get", "delete"]),
            rule(&["coordination.k8s.io"], &["leases"], &["create"]),
            leader_lease,
        ]),
        ..Default::default()
    }
}
