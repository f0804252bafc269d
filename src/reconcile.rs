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

use crate::context::{self, ClusterApi, Context, Scoped, retry_on_conflict};
use crate::types;
use crate::types::v1alpha1::argo_workflow::{ArgoWorkFlow, FINALIZER};
use crate::utils::retry::Backoff;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

mod cluster_role_binding;
mod config_map;
mod deployment;
mod service;
mod service_account;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("unable to reconcile {}: {}", kind, source))]
    Child {
        kind: &'static str,
        source: context::Error,
    },

    #[snafu(display("failed to update ArgoWorkFlow status after retries: {}", source))]
    Status { source: context::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Context { source } | Error::Child { source, .. } | Error::Status { source } => {
                source.is_not_found()
            }
            Error::Types { .. } => false,
        }
    }
}

/// Drives one ArgoWorkFlow towards its desired state.
///
/// A pass fetches the parent, resets stale conditions, converges the five
/// child objects in a fixed order and marks the parent Available. The first
/// failing child aborts the pass.
pub struct Reconciler<C> {
    pub(crate) api: C,
    pub(crate) status_backoff: Backoff,
    /// Requeue delay after consecutive failures of the same object
    pub(crate) requeue_backoff: Backoff,
    failures: Mutex<HashMap<String, u32>>,
}

impl<C: ClusterApi> Reconciler<C> {
    pub fn new(api: C) -> Self {
        Self {
            api,
            status_backoff: Backoff::default(),
            requeue_backoff: Backoff {
                steps: u32::MAX,
                duration: Duration::from_secs(5),
                factor: 2.0,
                jitter: 0.0,
                cap: Some(Duration::from_secs(300)),
            },
            failures: Mutex::default(),
        }
    }

    /// Delay before the first retry of a failed object
    pub fn with_error_requeue(mut self, requeue: Duration) -> Self {
        self.requeue_backoff.duration = requeue;
        self
    }

    /// Counts a failure of `namespace/name` and returns how long to wait
    /// before retrying it. The delay doubles per consecutive failure.
    pub fn requeue_after_failure(&self, name: &str, namespace: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt = failures.entry(format!("{namespace}/{name}")).or_insert(0);
        let delay = self.requeue_backoff.delay(*attempt);
        *attempt = attempt.saturating_add(1);
        delay
    }

    fn forget_failures(&self, name: &str, namespace: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&format!("{namespace}/{name}"));
    }

    pub async fn reconcile(&self, name: &str, namespace: &str) -> Result<Action, Error> {
        let result = self.converge(name, namespace).await;
        if result.is_ok() {
            self.forget_failures(name, namespace);
        }
        result
    }

    async fn converge(&self, name: &str, namespace: &str) -> Result<Action, Error> {
        info!(name, namespace, "reconciling ArgoWorkFlow");

        let mut workflow = match self.api.get::<ArgoWorkFlow>(name, namespace).await {
            Ok(workflow) => workflow,
            Err(e) if e.is_not_found() => {
                info!(
                    name,
                    namespace, "ArgoWorkFlow resource not found, ignoring since object must be deleted"
                );
                return Ok(Action::await_change());
            }
            Err(e) => {
                error!(name, namespace, error = %e, "unable to fetch ArgoWorkFlow");
                return Err(e.into());
            }
        };

        if workflow.is_deleting() {
            return self.cleanup(&workflow).await;
        }

        if !workflow.has_finalizer() {
            let mut finalizers = workflow.finalizers().to_vec();
            finalizers.push(FINALIZER.to_owned());
            workflow = self.api.set_finalizers(&workflow, finalizers).await?;
        }

        // conditions written for an older generation describe a spec that no longer exists
        if workflow.conditions_stale() {
            debug!(
                name,
                namespace,
                generation = workflow.generation(),
                "resetting status conditions"
            );
            workflow.init_conditions();
            workflow = self.update_status(&workflow).await?;
        }

        deployment::reconcile_deployment(&workflow, &self.api)
            .await
            .map_err(|source| child_failed("Deployment", &workflow, source))?;

        service::reconcile_service(&workflow, &self.api)
            .await
            .map_err(|source| child_failed("Service", &workflow, source))?;

        service_account::reconcile_service_account(&workflow, &self.api)
            .await
            .map_err(|source| child_failed("ServiceAccount", &workflow, source))?;

        cluster_role_binding::reconcile_cluster_role_binding(&workflow, &self.api)
            .await
            .map_err(|source| child_failed("ClusterRoleBinding", &workflow, source))?;

        config_map::reconcile_config_map(&workflow, &self.api)
            .await
            .map_err(|source| child_failed("ConfigMap", &workflow, source))?;

        if workflow.set_available() {
            self.update_status(&workflow).await?;
        }

        info!(name, namespace, "successfully reconciled ArgoWorkFlow");
        Ok(Action::await_change())
    }

    /// Writes `workflow.status` to the status subresource.
    ///
    /// On a version conflict the latest object is fetched and the same status
    /// is written on top of it, up to `status_backoff.steps` attempts.
    pub async fn update_status(&self, workflow: &ArgoWorkFlow) -> Result<ArgoWorkFlow, Error> {
        let name = workflow.name();
        let namespace = workflow.namespace()?;
        let (name, namespace) = (name.as_str(), namespace.as_str());

        let api = &self.api;
        let status = &workflow.status;
        let first_attempt = AtomicBool::new(true);
        let first_attempt = &first_attempt;

        let result = retry_on_conflict(&self.status_backoff, || async move {
            let mut target = if first_attempt.swap(false, Ordering::Relaxed) {
                workflow.clone()
            } else {
                debug!(
                    name,
                    namespace, "status update conflicted, retrieve the latest resource and retry"
                );
                api.get::<ArgoWorkFlow>(name, namespace).await?
            };

            target.status = status.clone();
            api.replace_status(&target).await
        })
        .await;

        match result {
            Ok(updated) => {
                debug!(name, namespace, "successfully updated object status");
                Ok(updated)
            }
            Err(source) => {
                error!(
                    name,
                    namespace,
                    error = %source,
                    "failed to update ArgoWorkFlow status after retries"
                );
                Err(Error::Status { source })
            }
        }
    }

    /// Removes what owner references cannot, then releases the finalizer.
    async fn cleanup(&self, workflow: &ArgoWorkFlow) -> Result<Action, Error> {
        if !workflow.has_finalizer() {
            return Ok(Action::await_change());
        }

        info!(
            name = %workflow.name(),
            namespace = ?workflow.namespace().ok(),
            "ArgoWorkFlow is being deleted, cleaning up"
        );

        cluster_role_binding::delete_cluster_role_binding(workflow, &self.api)
            .await
            .map_err(|source| child_failed("ClusterRoleBinding", workflow, source))?;

        let finalizers = workflow
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        self.api.set_finalizers(workflow, finalizers).await?;

        Ok(Action::await_change())
    }
}

fn child_failed(kind: &'static str, workflow: &ArgoWorkFlow, source: context::Error) -> Error {
    error!(
        name = %workflow.name(),
        namespace = ?workflow.namespace().ok(),
        error = %source,
        "unable to reconcile {kind}"
    );
    Error::Child { kind, source }
}

/// Creates `desired` when it does not exist yet and server-side applies it
/// when `needs_update` reports drift on the existing object.
pub(crate) async fn ensure<K, C, F>(
    api: &C,
    workflow: &ArgoWorkFlow,
    desired: K,
    needs_update: F,
) -> Result<K, context::Error>
where
    K: Scoped,
    C: ClusterApi,
    F: FnOnce(&K) -> Result<bool, types::error::Error>,
{
    let namespace = workflow.namespace()?;
    let name = desired.name_any();
    let kind = K::kind(&()).to_string();

    match api.get::<K>(&name, &namespace).await {
        Ok(existing) => {
            if !needs_update(&existing)? {
                debug!(kind = %kind, name = %name, "up to date");
                return Ok(existing);
            }

            let updated = api.apply(&desired, &namespace).await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "updated");
            publish(api, workflow, "Updated", &format!("{kind} {name} updated")).await;
            Ok(updated)
        }
        Err(e) if e.is_not_found() => {
            let created = api.create(&desired, &namespace).await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "created");
            publish(api, workflow, "Created", &format!("{kind} {name} created")).await;
            Ok(created)
        }
        Err(e) => Err(e),
    }
}

async fn publish<C: ClusterApi>(api: &C, workflow: &ArgoWorkFlow, reason: &str, message: &str) {
    if let Err(e) = api
        .record(workflow, EventType::Normal, reason, message)
        .await
    {
        warn!(error = %e, reason, "failed to publish event");
    }
}

pub async fn reconcile_argo_workflow(
    workflow: Arc<ArgoWorkFlow>,
    ctx: Arc<Reconciler<Context>>,
) -> Result<Action, Error> {
    let namespace = workflow.namespace()?;
    ctx.reconcile(&workflow.name(), &namespace).await
}
