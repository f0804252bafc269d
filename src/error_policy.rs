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

use crate::context::ClusterApi;
use crate::reconcile::{Error, Reconciler};
use crate::types::v1alpha1::argo_workflow::ArgoWorkFlow;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::warn;

/// Decides when a failed pass runs again.
///
/// Objects that vanished mid-pass wait for the next watch event. Everything
/// else is retried after a delay that doubles with each consecutive failure
/// of the same object, up to five minutes.
pub fn error_policy<C: ClusterApi>(
    object: Arc<ArgoWorkFlow>,
    error: &Error,
    ctx: Arc<Reconciler<C>>,
) -> Action {
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();

    if error.is_not_found() {
        warn!(name = %name, namespace = %namespace, error = %error, "reconcile failed");
        return Action::await_change();
    }

    let delay = ctx.requeue_after_failure(&name, &namespace);
    warn!(
        name = %name,
        namespace = %namespace,
        error = %error,
        retry_in_secs = delay.as_secs(),
        "reconcile failed"
    );
    Action::requeue(delay)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{FakeCluster, api_error, create_test_workflow};
    use std::time::Duration;

    fn child_error() -> Error {
        Error::Child {
            kind: "Service",
            source: api_error(500),
        }
    }

    #[test]
    fn test_consecutive_failures_back_off() {
        let ctx = Arc::new(
            Reconciler::new(FakeCluster::default()).with_error_requeue(Duration::from_secs(30)),
        );
        let object = Arc::new(create_test_workflow("wf-a", "ns1", 1));

        let delays: Vec<_> = (0..5)
            .map(|_| error_policy(object.clone(), &child_error(), ctx.clone()))
            .collect();
        assert_eq!(
            delays,
            [30, 60, 120, 240, 300]
                .map(|s| Action::requeue(Duration::from_secs(s)))
                .to_vec()
        );

        // other objects keep their own count
        let other = Arc::new(create_test_workflow("wf-b", "ns1", 1));
        assert_eq!(
            error_policy(other, &child_error(), ctx),
            Action::requeue(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_success_resets_the_backoff() {
        let cluster = FakeCluster::default();
        cluster.insert(&create_test_workflow("wf-a", "ns1", 1));
        let ctx = Arc::new(Reconciler::new(cluster));
        let object = Arc::new(create_test_workflow("wf-a", "ns1", 1));

        error_policy(object.clone(), &child_error(), ctx.clone());
        assert_eq!(
            error_policy(object.clone(), &child_error(), ctx.clone()),
            Action::requeue(Duration::from_secs(10))
        );

        ctx.reconcile("wf-a", "ns1").await.unwrap();
        assert_eq!(
            error_policy(object, &child_error(), ctx),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_not_found_waits_for_change() {
        let ctx = Arc::new(Reconciler::new(FakeCluster::default()));
        let object = Arc::new(create_test_workflow("wf-a", "ns1", 1));

        let error = Error::Context {
            source: api_error(404),
        };
        assert_eq!(error_policy(object, &error, ctx), Action::await_change());
    }
}
