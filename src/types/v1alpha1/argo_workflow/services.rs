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
use super::config::labels_contained;
use crate::types::v1alpha1::service::METRICS_PORT;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::util::intstr;

const METRICS_PORT_NAME: &str = "metrics";

impl ArgoWorkFlow {
    /// a new metrics Service for the workflow-controller
    pub fn new_service(&self) -> corev1::Service {
        let mut metadata = self.child_metadata(self.service_name());
        metadata.annotations = self.spec.service.annotations.clone();

        corev1::Service {
            metadata,
            spec: Some(corev1::ServiceSpec {
                type_: Some(self.spec.service.type_.to_string()),
                selector: Some(self.selector_labels()),
                ports: Some(vec![corev1::ServicePort {
                    port: self.spec.service.port,
                    target_port: Some(intstr::IntOrString::Int(METRICS_PORT)),
                    name: Some(METRICS_PORT_NAME.to_owned()),
                    protocol: Some("TCP".to_owned()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Compares only what the operator sets. Cluster IPs, node ports and other
    /// server-assigned fields are ignored.
    pub fn service_needs_update(&self, existing: &corev1::Service) -> bool {
        let desired = self.new_service();
        let (Some(existing_spec), Some(desired_spec)) = (&existing.spec, &desired.spec) else {
            return true;
        };

        if existing_spec.type_ != desired_spec.type_ {
            return true;
        }

        if existing_spec.selector != desired_spec.selector {
            return true;
        }

        let port_key = |p: &corev1::ServicePort| (p.name.clone(), p.port, p.target_port.clone());
        let existing_ports: Vec<_> = existing_spec.ports.iter().flatten().map(port_key).collect();
        let desired_ports: Vec<_> = desired_spec.ports.iter().flatten().map(port_key).collect();
        if existing_ports != desired_ports {
            return true;
        }

        !labels_contained(&desired.metadata.labels, &existing.metadata.labels)
            || !labels_contained(&desired.metadata.annotations, &existing.metadata.annotations)
    }
}
