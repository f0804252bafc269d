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
use super::{ArgoWorkFlow, CONFIG_HASH_ANNOTATION};
use crate::types;
use crate::types::v1alpha1::service::METRICS_PORT;
use k8s_openapi::api::apps::v1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr;
use serde::Serialize;

const CONTAINER_NAME: &str = "workflow-controller";
const HEALTH_PORT: i32 = 6060;

impl ArgoWorkFlow {
    fn controller_args(&self) -> Vec<String> {
        let mut args = vec![
            "--configmap".to_owned(),
            self.config_map_name(),
            "--executor-image".to_owned(),
            self.executor_image(),
            "--loglevel".to_owned(),
            self.log_level(),
        ];

        if self.spec.namespaced {
            args.push("--namespaced".to_owned());
        }

        args
    }

    fn controller_env(&self) -> Vec<corev1::EnvVar> {
        // leader election lock holder is the pod name
        let mut env_vars = vec![corev1::EnvVar {
            name: "LEADER_ELECTION_IDENTITY".to_owned(),
            value_from: Some(corev1::EnvVarSource {
                field_ref: Some(corev1::ObjectFieldSelector {
                    api_version: Some("v1".to_owned()),
                    field_path: "metadata.name".to_owned(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }];

        // user-provided vars override operator-managed ones
        for user_env in &self.spec.env {
            env_vars.retain(|e| e.name != user_env.name);
            env_vars.push(user_env.clone());
        }

        env_vars
    }

    pub fn new_deployment(&self) -> v1::Deployment {
        let labels = self.common_labels();

        let container = corev1::Container {
            name: CONTAINER_NAME.to_owned(),
            image: Some(self.spec.image.reference()),
            image_pull_policy: Some(self.spec.image.pull_policy.to_string()),
            command: Some(vec!["workflow-controller".to_owned()]),
            args: Some(self.controller_args()),
            env: Some(self.controller_env()),
            ports: Some(vec![corev1::ContainerPort {
                container_port: METRICS_PORT,
                name: Some("metrics".to_owned()),
                protocol: Some("TCP".to_owned()),
                ..Default::default()
            }]),
            liveness_probe: Some(corev1::Probe {
                http_get: Some(corev1::HTTPGetAction {
                    path: Some("/healthz".to_owned()),
                    port: intstr::IntOrString::Int(HEALTH_PORT),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(90),
                period_seconds: Some(60),
                timeout_seconds: Some(30),
                failure_threshold: Some(3),
                ..Default::default()
            }),
            resources: self.spec.resources.clone(),
            security_context: Some(corev1::SecurityContext {
                allow_privilege_escalation: Some(false),
                read_only_root_filesystem: Some(true),
                run_as_non_root: Some(true),
                capabilities: Some(corev1::Capabilities {
                    drop: Some(vec!["ALL".to_owned()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        v1::Deployment {
            metadata: self.child_metadata(self.deployment_name()),
            spec: Some(v1::DeploymentSpec {
                replicas: Some(self.spec.replicas),
                selector: metav1::LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template: corev1::PodTemplateSpec {
                    metadata: Some(metav1::ObjectMeta {
                        labels: Some(labels),
                        annotations: Some(
                            [(CONFIG_HASH_ANNOTATION.to_owned(), self.config_hash())]
                                .into_iter()
                                .collect(),
                        ),
                        ..Default::default()
                    }),
                    spec: Some(corev1::PodSpec {
                        service_account_name: Some(self.service_account_name()),
                        containers: vec![container],
                        security_context: self.spec.security_context.clone(),
                        node_selector: self.spec.node_selector.clone(),
                        affinity: self.spec.affinity.clone(),
                        tolerations: self.spec.tolerations.clone(),
                        image_pull_secrets: if self.spec.image_pull_secrets.is_empty() {
                            None
                        } else {
                            Some(self.spec.image_pull_secrets.clone())
                        },
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Checks if a Deployment needs to be updated based on differences between
    /// the existing Deployment and the desired state defined in the ArgoWorkFlow spec.
    ///
    /// Only fields the operator sets are compared, defaults filled in by the
    /// API server never count as drift.
    pub fn deployment_needs_update(
        &self,
        existing: &v1::Deployment,
    ) -> Result<bool, types::error::Error> {
        let desired = self.new_deployment();
        let existing_spec = deployment_spec(existing)?;
        let desired_spec = deployment_spec(&desired)?;

        if existing_spec.replicas != desired_spec.replicas {
            return Ok(true);
        }

        let existing_template = &existing_spec.template;
        let desired_template = &desired_spec.template;

        let existing_meta = existing_template.metadata.clone().unwrap_or_default();
        let desired_meta = desired_template.metadata.clone().unwrap_or_default();
        if !labels_contained(&desired_meta.labels, &existing_meta.labels)
            || !labels_contained(&desired_meta.annotations, &existing_meta.annotations)
        {
            return Ok(true);
        }

        let (Some(existing_pod_spec), Some(desired_pod_spec)) =
            (&existing_template.spec, &desired_template.spec)
        else {
            return Ok(true);
        };

        if existing_pod_spec.service_account_name != desired_pod_spec.service_account_name
            || existing_pod_spec.node_selector != desired_pod_spec.node_selector
            || existing_pod_spec.image_pull_secrets != desired_pod_spec.image_pull_secrets
        {
            return Ok(true);
        }

        if differs(&existing_pod_spec.affinity, &desired_pod_spec.affinity)?
            || differs(&existing_pod_spec.tolerations, &desired_pod_spec.tolerations)?
            || differs(
                &existing_pod_spec.security_context,
                &desired_pod_spec.security_context,
            )?
        {
            return Ok(true);
        }

        let Some(desired_container) = desired_pod_spec.containers.first() else {
            return Ok(false);
        };
        let Some(existing_container) = existing_pod_spec
            .containers
            .iter()
            .find(|c| c.name == desired_container.name)
        else {
            return Ok(true);
        };

        Ok(existing_container.image != desired_container.image
            || existing_container.image_pull_policy != desired_container.image_pull_policy
            || existing_container.command != desired_container.command
            || existing_container.args != desired_container.args
            || serde_json::to_value(&existing_container.env)?
                != serde_json::to_value(&desired_container.env)?
            || differs(&existing_container.resources, &desired_container.resources)?)
    }

    /// Rejects updates that would change `spec.selector`, which the API
    /// server refuses for Deployments.
    pub fn validate_deployment_update(
        &self,
        existing: &v1::Deployment,
    ) -> Result<(), types::error::Error> {
        let desired = self.new_deployment();
        let existing_spec = deployment_spec(existing)?;
        let desired_spec = deployment_spec(&desired)?;

        if existing_spec.selector != desired_spec.selector {
            return Err(types::error::Error::ImmutableFieldModified {
                name: self.deployment_name(),
                field: "spec.selector".to_string(),
                message: "Deployment selector cannot be modified. Delete the Deployment to let the operator recreate it."
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Deep comparison of optional fields. The API server fills unset pod
/// `securityContext` and container `resources` with empty objects, so a
/// missing value and an empty one are equal.
fn differs<T>(existing: &Option<T>, desired: &Option<T>) -> Result<bool, serde_json::Error>
where
    T: Serialize + Default + Clone,
{
    Ok(serde_json::to_value(existing.clone().unwrap_or_default())?
        != serde_json::to_value(desired.clone().unwrap_or_default())?)
}

fn deployment_spec(deployment: &v1::Deployment) -> Result<&v1::DeploymentSpec, types::error::Error> {
    deployment
        .spec
        .as_ref()
        .ok_or_else(|| types::error::Error::MissingSpec {
            kind: "Deployment".to_string(),
            name: deployment.metadata.name.clone().unwrap_or_default(),
        })
}
