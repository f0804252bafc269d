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

use crate::types::v1alpha1::k8s::ImagePullPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTROLLER_REPOSITORY: &str = "quay.io/argoproj/workflow-controller";
pub const DEFAULT_EXECUTOR_REPOSITORY: &str = "quay.io/argoproj/argoexec";
pub const DEFAULT_TAG: &str = "v3.4.8";

/// Container image of the Argo workflow-controller.
///
/// The executor image defaults to the argoexec image with the same tag, so
/// bumping `tag` upgrades both halves of Argo together.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    #[serde(default = "default_repository")]
    pub repository: String,

    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default)]
    pub pull_policy: ImagePullPolicy,
}

fn default_repository() -> String {
    DEFAULT_CONTROLLER_REPOSITORY.to_owned()
}

fn default_tag() -> String {
    DEFAULT_TAG.to_owned()
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            repository: default_repository(),
            tag: default_tag(),
            pull_policy: ImagePullPolicy::default(),
        }
    }
}

impl ImageConfig {
    /// `repository:tag`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    pub fn default_executor_reference(&self) -> String {
        format!("{}:{}", DEFAULT_EXECUTOR_REPOSITORY, self.tag)
    }
}
