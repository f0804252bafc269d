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
use k8s_openapi::api::rbac::v1 as rbacv1;
use tracing::info;

pub async fn reconcile_cluster_role_binding<C: ClusterApi>(
    workflow: &ArgoWorkFlow,
    api: &C,
) -> Result<(), Error> {
    let name = workflow.cluster_role_binding_name();
    let namespace = workflow.namespace()?;

    // roleRef is immutable, a binding to another role has to be recreated
    match api
        .get::<rbacv1::ClusterRoleBinding>(&name, &namespace)
        .await
    {
        Ok(existing) if workflow.cluster_role_binding_needs_recreate(&existing) => {
            info!(
                name = %name,
                role = %workflow.cluster_role(),
                "cluster role changed, recreating ClusterRoleBinding"
            );
            api.delete::<rbacv1::ClusterRoleBinding>(&name, &namespace)
                .await?;
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    ensure(
        api,
        workflow,
        workflow.new_cluster_role_binding(),
        |existing| Ok(workflow.cluster_role_binding_needs_update(existing)),
    )
    .await?;

    Ok(())
}

pub async fn delete_cluster_role_binding<C: ClusterApi>(
    workflow: &ArgoWorkFlow,
    api: &C,
) -> Result<(), Error> {
    let name = workflow.cluster_role_binding_name();

    api.delete::<rbacv1::ClusterRoleBinding>(&name, &workflow.namespace()?)
        .await
        .or_else(|e| if e.is_not_found() { Ok(()) } else { Err(e) })?;

    info!(name = %name, "ClusterRoleBinding removed");
    Ok(())
}
