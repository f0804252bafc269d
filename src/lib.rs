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

use crate::context::Context;
use crate::error_policy::error_policy;
use crate::reconcile::{Reconciler, reconcile_argo_workflow};
use crate::types::v1alpha1::argo_workflow::{
    ArgoWorkFlow, MANAGED_BY, MANAGED_BY_LABEL, OWNER_NAMESPACE_LABEL, binding_owner,
};
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::CustomResourceExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod context;
pub mod error_policy;
pub mod rbac;
pub mod reconcile;
pub mod types;
pub mod utils;


shadow_rs::shadow!(build);

fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Runs the controller until a termination signal arrives.
///
/// With `namespace` set only ArgoWorkFlows in that namespace are watched.
pub async fn run(
    namespace: Option<String>,
    error_requeue: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    info!(
        version = build::PKG_VERSION,
        commit = build::SHORT_COMMIT,
        build_time = build::BUILD_TIME,
        namespace = ?namespace,
        "starting argo-workflow-operator"
    );

    let client = Client::try_default().await?;
    let namespace = namespace.as_deref();

    let reconciler = Reconciler::new(Context::new(client.clone())).with_error_requeue(error_requeue);

    Controller::new(
        api_for::<ArgoWorkFlow>(&client, namespace),
        watcher::Config::default(),
    )
    .owns(
        api_for::<appsv1::Deployment>(&client, namespace),
        watcher::Config::default(),
    )
    .owns(
        api_for::<corev1::Service>(&client, namespace),
        watcher::Config::default(),
    )
    .owns(
        api_for::<corev1::ServiceAccount>(&client, namespace),
        watcher::Config::default(),
    )
    .owns(
        api_for::<corev1::ConfigMap>(&client, namespace),
        watcher::Config::default(),
    )
    .watches(
        Api::<rbacv1::ClusterRoleBinding>::all(client.clone()),
        binding_watcher_config(namespace),
        binding_owner_in(namespace.map(str::to_owned)),
    )
    .shutdown_on_signal()
    .run(reconcile_argo_workflow, error_policy, Arc::new(reconciler))
    .for_each(|res| async move {
        match res {
            Ok((object, _)) => info!(
                name = %object.name,
                namespace = ?object.namespace,
                "reconciled successfully"
            ),
            Err(e) => warn!("reconcile failed: {}", e),
        }
    })
    .await;

    info!("controller stopped");
    Ok(())
}

/// ClusterRoleBindings are cluster scoped, so they are watched by label
/// rather than through owner references.
fn binding_watcher_config(namespace: Option<&str>) -> watcher::Config {
    let selector = match namespace {
        Some(namespace) => format!(
            "{MANAGED_BY_LABEL}={MANAGED_BY},{OWNER_NAMESPACE_LABEL}={namespace}"
        ),
        None => format!("{MANAGED_BY_LABEL}={MANAGED_BY}"),
    };
    watcher::Config::default().labels(&selector)
}

fn binding_owner_in(
    namespace: Option<String>,
) -> impl Fn(rbacv1::ClusterRoleBinding) -> Option<ObjectRef<ArgoWorkFlow>> + Send + Sync + 'static
{
    move |binding| {
        binding_owner(&binding).filter(|owner| {
            namespace.is_none() || owner.namespace.as_deref() == namespace.as_deref()
        })
    }
}

async fn write_yaml<T: Serialize>(
    value: &T,
    file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(value)?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}

/// Writes the ArgoWorkFlow CustomResourceDefinition as YAML
pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    write_yaml(&ArgoWorkFlow::crd(), file).await
}

/// Writes the ClusterRole the operator needs as YAML
pub async fn rbac(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    write_yaml(&rbac::operator_cluster_role(), file).await
}

#[cfg(test)]
mod crd_tests {
    use super::*;
    use crate::tests::create_test_workflow;

    #[test]
    fn test_binding_events_map_to_watched_workflows() {
        let binding = create_test_workflow("wf-a", "ns1", 1).new_cluster_role_binding();

        assert_eq!(
            binding_owner_in(None)(binding.clone()),
            Some(ObjectRef::new("wf-a").within("ns1"))
        );
        assert_eq!(
            binding_owner_in(Some("ns1".to_string()))(binding.clone()),
            Some(ObjectRef::new("wf-a").within("ns1"))
        );
        assert_eq!(binding_owner_in(Some("ns2".to_string()))(binding), None);

        let config = binding_watcher_config(Some("ns1"));
        assert_eq!(
            config.label_selector.as_deref(),
            Some("app.kubernetes.io/managed-by=argo-workflow-operator,stack.zncdata.net/owner-namespace=ns1")
        );
    }

    #[test]
    fn test_crd_identity() {
        let crd = ArgoWorkFlow::crd();

        assert_eq!(crd.spec.group, "stack.zncdata.net");
        assert_eq!(crd.spec.names.kind, "ArgoWorkFlow");
        assert_eq!(crd.spec.names.plural, "argoworkflows");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.names.short_names, Some(vec!["awf".to_string()]));

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());
    }
}
