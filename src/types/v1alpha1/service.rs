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

use crate::types::v1alpha1::k8s::ServiceType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Port the workflow-controller serves Prometheus metrics on.
pub const METRICS_PORT: i32 = 9090;

/// Exposure of the workflow-controller metrics endpoint.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default, rename = "type")]
    pub type_: ServiceType,

    #[serde(default = "default_port")]
    pub port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

fn default_port() -> i32 {
    METRICS_PORT
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            type_: ServiceType::default(),
            port: default_port(),
            annotations: None,
        }
    }
}
