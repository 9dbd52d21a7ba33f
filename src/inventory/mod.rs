//! Narrow interface over the Kubernetes inventory
//!
//! The control loops never talk to `kube::Api` directly; they consume this
//! trait so the reconciliation logic can be exercised against a mock. The
//! real implementation is a thin mapping onto typed APIs for the kinds
//! `k8s-openapi` ships, and onto [`DynamicObject`] for the CRDs and the
//! removed `batch/v1beta1` CronJob variant.
//!
//! Writes use optimistic replace: the object carries the resourceVersion it
//! was fetched with, and a stale version surfaces as HTTP 409, which
//! [`retry_on_conflict`] absorbs with a fresh read-modify-write attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::core::ApiResource;
use kube::{Client, ResourceExt};
use tokio::time::sleep;

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

/// Field manager recorded on every write.
pub const FIELD_MANAGER: &str = "ns-suspender";

/// Bounded attempts for the optimistic-concurrency write loop.
pub const CONFLICT_RETRIES: usize = 5;

/// Base delay between conflict retries.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(10);

/// Kinds served through the dynamic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicKind {
    /// `batch/v1beta1` CronJob, still served by older clusters.
    CronJobBeta,
    /// `keda.sh/v1alpha1` ScaledObject.
    ScaledObject,
    /// `monitoring.coreos.com/v1` Prometheus.
    Prometheus,
}

impl DynamicKind {
    pub fn api_resource(&self) -> ApiResource {
        let (group, version, kind, plural) = match self {
            DynamicKind::CronJobBeta => ("batch", "v1beta1", "CronJob", "cronjobs"),
            DynamicKind::ScaledObject => ("keda.sh", "v1alpha1", "ScaledObject", "scaledobjects"),
            DynamicKind::Prometheus => {
                ("monitoring.coreos.com", "v1", "Prometheus", "prometheuses")
            }
        };
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
    }

    /// Kind name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicKind::CronJobBeta => "cronjob (beta)",
            DynamicKind::ScaledObject => "scaledobject",
            DynamicKind::Prometheus => "prometheus",
        }
    }
}

/// The inventory operations the control loops need, and nothing more.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;
    async fn update_namespace(&self, obj: &Namespace) -> Result<Namespace>;

    async fn list_deployments(&self, ns: &str) -> Result<Vec<Deployment>>;
    async fn get_deployment(&self, ns: &str, name: &str) -> Result<Deployment>;
    async fn update_deployment(&self, ns: &str, obj: &Deployment) -> Result<Deployment>;

    async fn list_stateful_sets(&self, ns: &str) -> Result<Vec<StatefulSet>>;
    async fn get_stateful_set(&self, ns: &str, name: &str) -> Result<StatefulSet>;
    async fn update_stateful_set(&self, ns: &str, obj: &StatefulSet) -> Result<StatefulSet>;

    async fn list_cron_jobs(&self, ns: &str) -> Result<Vec<CronJob>>;
    async fn get_cron_job(&self, ns: &str, name: &str) -> Result<CronJob>;
    async fn update_cron_job(&self, ns: &str, obj: &CronJob) -> Result<CronJob>;

    async fn list_jobs(&self, ns: &str) -> Result<Vec<Job>>;
    async fn get_job(&self, ns: &str, name: &str) -> Result<Job>;
    async fn update_job(&self, ns: &str, obj: &Job) -> Result<Job>;

    async fn list_dynamic(&self, kind: DynamicKind, ns: &str) -> Result<Vec<DynamicObject>>;
    async fn get_dynamic(&self, kind: DynamicKind, ns: &str, name: &str)
        -> Result<DynamicObject>;
    async fn update_dynamic(
        &self,
        kind: DynamicKind,
        ns: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;
}

/// Real inventory backed by a [`kube::Client`].
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
    dry_run: bool,
}

impl KubeInventory {
    pub fn new(client: Client, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: self.dry_run,
            field_manager: Some(FIELD_MANAGER.to_string()),
        }
    }

    fn dynamic_api(&self, kind: DynamicKind, ns: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), ns, &kind.api_resource())
    }
}

#[async_trait]
impl Inventory for KubeInventory {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn update_namespace(&self, obj: &Namespace) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.replace(&obj.name_any(), &self.post_params(), obj).await?)
    }

    async fn list_deployments(&self, ns: &str) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_deployment(&self, ns: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn update_deployment(&self, ns: &str, obj: &Deployment) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        Ok(api.replace(&obj.name_any(), &self.post_params(), obj).await?)
    }

    async fn list_stateful_sets(&self, ns: &str) -> Result<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_stateful_set(&self, ns: &str, name: &str) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn update_stateful_set(&self, ns: &str, obj: &StatefulSet) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
        Ok(api.replace(&obj.name_any(), &self.post_params(), obj).await?)
    }

    async fn list_cron_jobs(&self, ns: &str) -> Result<Vec<CronJob>> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), ns);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_cron_job(&self, ns: &str, name: &str) -> Result<CronJob> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn update_cron_job(&self, ns: &str, obj: &CronJob) -> Result<CronJob> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), ns);
        Ok(api.replace(&obj.name_any(), &self.post_params(), obj).await?)
    }

    async fn list_jobs(&self, ns: &str) -> Result<Vec<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_job(&self, ns: &str, name: &str) -> Result<Job> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn update_job(&self, ns: &str, obj: &Job) -> Result<Job> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        Ok(api.replace(&obj.name_any(), &self.post_params(), obj).await?)
    }

    async fn list_dynamic(&self, kind: DynamicKind, ns: &str) -> Result<Vec<DynamicObject>> {
        Ok(self
            .dynamic_api(kind, ns)
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn get_dynamic(
        &self,
        kind: DynamicKind,
        ns: &str,
        name: &str,
    ) -> Result<DynamicObject> {
        Ok(self.dynamic_api(kind, ns).get(name).await?)
    }

    async fn update_dynamic(
        &self,
        kind: DynamicKind,
        ns: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        Ok(self
            .dynamic_api(kind, ns)
            .replace(&obj.name_any(), &self.post_params(), obj)
            .await?)
    }
}

/// Run a read-modify-write closure until it succeeds or conflict retries
/// are exhausted. Non-conflict errors surface immediately.
///
/// The closure owns the whole attempt: fetch the object fresh, apply the
/// mutation, issue the update.
pub async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_conflict() => {
                attempt += 1;
                if attempt >= CONFLICT_RETRIES {
                    return Err(Error::ConflictRetriesExhausted(attempt));
                }
                sleep(CONFLICT_BACKOFF * attempt as u32).await;
            }
            other => return other,
        }
    }
}
