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

use crate::types;
use crate::utils::retry::{Backoff, retry_if};
use crate::types::v1alpha1::argo_workflow::ArgoWorkFlow;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt, api::Api};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::fmt::Debug;
use std::future::Future;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "argo-workflow-operator";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// The write was rejected because the object changed since it was read
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }
}

/// Retries `operation` while the API server answers with a version conflict.
pub async fn retry_on_conflict<T, F, Fut>(backoff: &Backoff, operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    retry_if(backoff, Error::is_conflict, operation).await
}

/// Resolves the API endpoint of a kind the operator reads or writes.
///
/// Namespaced kinds use the given namespace, cluster-scoped kinds ignore it.
pub trait Scoped:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
    fn api(client: kube::Client, namespace: &str) -> Api<Self>;
}

macro_rules! namespaced {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Scoped for $kind {
                fn api(client: kube::Client, namespace: &str) -> Api<Self> {
                    Api::namespaced(client, namespace)
                }
            }
        )+
    };
}

namespaced!(
    ArgoWorkFlow,
    appsv1::Deployment,
    corev1::Service,
    corev1::ServiceAccount,
    corev1::ConfigMap,
);

impl Scoped for rbacv1::ClusterRoleBinding {
    fn api(client: kube::Client, _namespace: &str) -> Api<Self> {
        Api::all(client)
    }
}

/// Everything the reconciler needs from the cluster.
///
/// Every call is a single round-trip; none of them retry on their own.
pub trait ClusterApi: Send + Sync {
    fn get<K: Scoped>(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    fn create<K: Scoped>(
        &self,
        resource: &K,
        namespace: &str,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    /// Server-side apply, taking ownership of conflicting fields
    fn apply<K: Scoped>(
        &self,
        resource: &K,
        namespace: &str,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    fn delete<K: Scoped>(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Replaces the status subresource. The object's resourceVersion is sent
    /// along, so a concurrent write surfaces as a conflict.
    fn replace_status(
        &self,
        workflow: &ArgoWorkFlow,
    ) -> impl Future<Output = Result<ArgoWorkFlow, Error>> + Send;

    fn set_finalizers(
        &self,
        workflow: &ArgoWorkFlow,
        finalizers: Vec<String>,
    ) -> impl Future<Output = Result<ArgoWorkFlow, Error>> + Send;

    fn record(
        &self,
        workflow: &ArgoWorkFlow,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) recorder: Recorder,
}

impl Context {
    pub fn new(client: kube::Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }
}

impl ClusterApi for Context {
    async fn get<K: Scoped>(&self, name: &str, namespace: &str) -> Result<K, Error> {
        K::api(self.client.clone(), namespace)
            .get(name)
            .context(KubeSnafu)
            .await
    }

    async fn create<K: Scoped>(&self, resource: &K, namespace: &str) -> Result<K, Error> {
        K::api(self.client.clone(), namespace)
            .create(&PostParams::default(), resource)
            .context(KubeSnafu)
            .await
    }

    async fn apply<K: Scoped>(&self, resource: &K, namespace: &str) -> Result<K, Error> {
        K::api(self.client.clone(), namespace)
            .patch(
                &resource.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(resource),
            )
            .context(KubeSnafu)
            .await
    }

    async fn delete<K: Scoped>(&self, name: &str, namespace: &str) -> Result<(), Error> {
        K::api(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .context(KubeSnafu)
            .await?;
        Ok(())
    }

    async fn replace_status(&self, workflow: &ArgoWorkFlow) -> Result<ArgoWorkFlow, Error> {
        let api: Api<ArgoWorkFlow> = Api::namespaced(self.client.clone(), &workflow.namespace()?);

        api.replace_status(&workflow.name(), &PostParams::default(), workflow)
            .context(KubeSnafu)
            .await
    }

    async fn set_finalizers(
        &self,
        workflow: &ArgoWorkFlow,
        finalizers: Vec<String>,
    ) -> Result<ArgoWorkFlow, Error> {
        let api: Api<ArgoWorkFlow> = Api::namespaced(self.client.clone(), &workflow.namespace()?);
        let mut patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        // a resourceVersion makes the merge patch fail on a concurrent finalizer edit
        if let Some(rv) = workflow.resource_version() {
            patch["metadata"]["resourceVersion"] = rv.into();
        }

        api.patch(&workflow.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .context(KubeSnafu)
            .await
    }

    /// send event
    async fn record(
        &self,
        workflow: &ArgoWorkFlow,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &workflow.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::Kube {
            source: kube::Error::Api(
                kube::core::Status {
                    status: Some(kube::core::response::StatusSummary::Failure),
                    message: "injected".to_string(),
                    reason: String::new(),
                    code,
                    metadata: None,
                    details: None,
                }
                .boxed(),
            ),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_conflict());
        assert!(!api_error(500).is_not_found());

        let types_error: Error = types::error::Error::NoNamespace.into();
        assert!(!types_error.is_not_found());
    }
}
