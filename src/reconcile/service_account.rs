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

use super::ensure;
use crate::context::{ClusterApi, Error};
use crate::types::v1alpha1::argo_workflow::ArgoWorkFlow;

pub async fn reconcile_service_account<C: ClusterApi>(
    workflow: &ArgoWorkFlow,
    api: &C,
) -> Result<(), Error> {
    ensure(api, workflow, workflow.new_service_account(), |existing| {
        Ok(workflow.service_account_needs_update(existing))
    })
    .await?;

    Ok(())
}
