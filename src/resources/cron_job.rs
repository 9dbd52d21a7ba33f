//! Scheduled-job driver: CronJobs (both API variants) and Jobs
//!
//! All three carry a boolean `spec.suspend` with identical semantics, so
//! one driver reconciles them and is invoked once per variant. Clusters
//! still serving `batch/v1beta1` expose the beta CronJob through the
//! dynamic API.

use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::inventory::{retry_on_conflict, DynamicKind, Inventory};

/// The suspend-flag-bearing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledKind {
    CronJob,
    CronJobBeta,
    Job,
}

impl ScheduledKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledKind::CronJob => "cronjob",
            ScheduledKind::CronJobBeta => "cronjob (beta)",
            ScheduledKind::Job => "job",
        }
    }

    pub async fn list(&self, inv: &dyn Inventory, ns: &str) -> Result<Vec<ScheduledJob>> {
        let items = match self {
            ScheduledKind::CronJob => inv
                .list_cron_jobs(ns)
                .await?
                .into_iter()
                .map(ScheduledJob::CronJob)
                .collect(),
            ScheduledKind::CronJobBeta => inv
                .list_dynamic(DynamicKind::CronJobBeta, ns)
                .await?
                .into_iter()
                .map(ScheduledJob::CronJobBeta)
                .collect(),
            ScheduledKind::Job => inv
                .list_jobs(ns)
                .await?
                .into_iter()
                .map(ScheduledJob::Job)
                .collect(),
        };
        Ok(items)
    }
}

/// Uniform view over one suspendable job resource.
#[derive(Debug, Clone)]
pub enum ScheduledJob {
    CronJob(CronJob),
    CronJobBeta(DynamicObject),
    Job(Job),
}

impl ScheduledJob {
    pub fn kind(&self) -> ScheduledKind {
        match self {
            ScheduledJob::CronJob(_) => ScheduledKind::CronJob,
            ScheduledJob::CronJobBeta(_) => ScheduledKind::CronJobBeta,
            ScheduledJob::Job(_) => ScheduledKind::Job,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ScheduledJob::CronJob(o) => o.name_any(),
            ScheduledJob::CronJobBeta(o) => o.name_any(),
            ScheduledJob::Job(o) => o.name_any(),
        }
    }

    /// `spec.suspend`; the API defaults an unset flag to false.
    pub fn suspended(&self) -> bool {
        match self {
            ScheduledJob::CronJob(o) => o.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false),
            ScheduledJob::CronJobBeta(o) => o.data["spec"]["suspend"].as_bool().unwrap_or(false),
            ScheduledJob::Job(o) => o.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false),
        }
    }

    pub fn set_suspended(&mut self, suspend: bool) {
        match self {
            ScheduledJob::CronJob(o) => {
                if let Some(spec) = o.spec.as_mut() {
                    spec.suspend = Some(suspend);
                }
            }
            ScheduledJob::CronJobBeta(o) => {
                o.data["spec"]["suspend"] = json!(suspend);
            }
            ScheduledJob::Job(o) => {
                if let Some(spec) = o.spec.as_mut() {
                    spec.suspend = Some(suspend);
                }
            }
        }
    }

    async fn fetch(
        inv: &dyn Inventory,
        kind: ScheduledKind,
        ns: &str,
        name: &str,
    ) -> Result<Self> {
        let fresh = match kind {
            ScheduledKind::CronJob => ScheduledJob::CronJob(inv.get_cron_job(ns, name).await?),
            ScheduledKind::CronJobBeta => {
                ScheduledJob::CronJobBeta(inv.get_dynamic(DynamicKind::CronJobBeta, ns, name).await?)
            }
            ScheduledKind::Job => ScheduledJob::Job(inv.get_job(ns, name).await?),
        };
        Ok(fresh)
    }

    async fn update(&self, inv: &dyn Inventory, ns: &str) -> Result<()> {
        match self {
            ScheduledJob::CronJob(o) => inv.update_cron_job(ns, o).await.map(|_| ()),
            ScheduledJob::CronJobBeta(o) => inv
                .update_dynamic(DynamicKind::CronJobBeta, ns, o)
                .await
                .map(|_| ()),
            ScheduledJob::Job(o) => inv.update_job(ns, o).await.map(|_| ()),
        }
    }
}

async fn flip_suspend(
    inv: &dyn Inventory,
    items: &[ScheduledJob],
    ns: &str,
    suspend: bool,
) -> Result<bool> {
    let mut patched = false;
    for j in items {
        if j.suspended() == suspend {
            continue;
        }
        let kind = j.kind();
        let name = j.name();
        info!(
            namespace = ns,
            kind = kind.as_str(),
            name = %name,
            "updating {name} from suspend: {} to suspend: {suspend}",
            !suspend
        );
        let name = name.as_str();
        retry_on_conflict(|| async move {
            let mut fresh = ScheduledJob::fetch(inv, kind, ns, &name).await?;
            if fresh.suspended() == suspend {
                return Ok(());
            }
            fresh.set_suspended(suspend);
            fresh.update(inv, ns).await
        })
        .await?;
        patched = true;
    }
    Ok(patched)
}

/// Clear the suspend flag on every suspended job resource. Returns whether
/// anything was written.
pub async fn ensure_running(
    inv: &dyn Inventory,
    items: &[ScheduledJob],
    ns: &str,
) -> Result<bool> {
    flip_suspend(inv, items, ns, false).await
}

/// Set the suspend flag on every unsuspended job resource.
pub async fn ensure_suspended(inv: &dyn Inventory, items: &[ScheduledJob], ns: &str) -> Result<()> {
    flip_suspend(inv, items, ns, true).await.map(|_| ())
}
