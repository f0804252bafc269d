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

//! Common Kubernetes enum types used across the operator

use k8s_openapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Image pull policy for containers.
/// - Always: Always pull the image
/// - Never: Never pull the image
/// - IfNotPresent: Pull the image if not present locally (default)
///
/// https://kubernetes.io/docs/concepts/containers/images/#image-pull-policy
#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, Display, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum ImagePullPolicy {
    #[strum(to_string = "Always")]
    Always,

    #[strum(to_string = "Never")]
    Never,

    #[strum(to_string = "IfNotPresent")]
    #[default]
    IfNotPresent,
}

/// How the metrics Service is exposed.
///
/// https://kubernetes.io/docs/concepts/services-networking/service/#publishing-services-service-types
#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum ServiceType {
    #[strum(to_string = "ClusterIP")]
    #[default]
    ClusterIP,

    #[strum(to_string = "NodePort")]
    NodePort,

    #[strum(to_string = "LoadBalancer")]
    LoadBalancer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names_match_kubernetes() {
        assert_eq!(ImagePullPolicy::default().to_string(), "IfNotPresent");
        assert_eq!(ServiceType::default().to_string(), "ClusterIP");
        assert_eq!(
            serde_json::to_value(ServiceType::LoadBalancer).ok(),
            Some(serde_json::json!("LoadBalancer"))
        );
        assert_eq!(
            serde_json::from_value::<ImagePullPolicy>(serde_json::json!("Always")).ok(),
            Some(ImagePullPolicy::Always)
        );
    }
}
