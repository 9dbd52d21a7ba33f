//! Suspender: the per-namespace reconciliation state machine
//!
//! Consumes one namespace snapshot at a time from the work queue and walks
//! it through three phases: resolve the desired state from annotations,
//! enumerate the namespace's resources, and drive every resource toward
//! that state. The current state is never held in process memory between
//! passes; it is re-read from the namespace annotation every time, which
//! is what makes repeated passes over a conformant namespace free of
//! writes.
//!
//! Two independent triggers move a `Running` namespace to `Suspended`:
//! the daily wall-clock time, evaluated first, then the expiry of a
//! manual-resume extension. A manual resume is detected when a driver had
//! to patch something while the namespace was already flagged `Running`;
//! the namespace then gets one bounded extension window instead of being
//! re-suspended on the next pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::annotations::{AnnotationKeys, DesiredState};
use crate::clock::Clock;
use crate::config::Options;
use crate::error::Result;
use crate::inventory::{retry_on_conflict, DynamicKind, Inventory};
use crate::resources::rds::DbCluster;
use crate::resources::{cron_job, rds, scaled_object, workload};
use crate::resources::{ExternalDb, ScheduledKind, WorkloadKind};

/// Why a `Running → Suspended` transition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Namespace seen for the first time; flagged `Running` by default.
    FirstSighting,
    /// The daily wall-clock suspension time has passed.
    DailySchedule,
    /// A manual-resume extension window has expired.
    ExtensionExpired,
}

/// Outcome of resolving a namespace's current state.
#[derive(Debug, PartialEq, Eq)]
pub enum StateDecision {
    /// The annotation already holds a supported state; proceed with it.
    Keep(DesiredState),
    /// Patch the annotation to `to`, then proceed with it.
    Transition { to: DesiredState, trigger: Trigger },
    /// The annotation holds something we do not understand; skip the item.
    Unrecognised(String),
}

/// Pure phase-1 decision: what state should this namespace be driven
/// toward right now? Trigger order is fixed: daily schedule first, then
/// extension expiry.
pub fn decide_state(
    annotations: &BTreeMap<String, String>,
    keys: &AnnotationKeys,
    now: DateTime<Tz>,
) -> StateDecision {
    match keys.desired_state_of(annotations) {
        None => StateDecision::Transition {
            to: DesiredState::Running,
            trigger: Trigger::FirstSighting,
        },
        Some(Err(_)) => StateDecision::Unrecognised(
            annotations.get(&keys.desired_state).cloned().unwrap_or_default(),
        ),
        Some(Ok(DesiredState::Suspended)) => StateDecision::Keep(DesiredState::Suspended),
        Some(Ok(DesiredState::Running)) => {
            if let Some(daily) = annotations.get(&keys.daily_suspend_time) {
                match Clock::minutes_of_day(now, daily) {
                    Ok((now_mins, at_mins)) if now_mins >= at_mins => {
                        return StateDecision::Transition {
                            to: DesiredState::Suspended,
                            trigger: Trigger::DailySchedule,
                        };
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(value = %daily, error = %e, "cannot parse dailySuspendTime");
                    }
                }
            }
            if let Some(next) = annotations.get(&keys.next_suspend_time) {
                match Clock::parse_next_suspend(next) {
                    // strictly after: an expiry equal to "now" has not passed yet
                    Ok(at) if now > at => {
                        return StateDecision::Transition {
                            to: DesiredState::Suspended,
                            trigger: Trigger::ExtensionExpired,
                        };
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(value = %next, error = %e, "cannot parse nextSuspendTime");
                    }
                }
            }
            StateDecision::Keep(DesiredState::Running)
        }
    }
}

/// The reconciliation loop and its collaborators.
pub struct Suspender {
    inv: Arc<dyn Inventory>,
    db: Option<Arc<dyn ExternalDb>>,
    opts: Arc<Options>,
    keys: AnnotationKeys,
    clock: Clock,
}

impl Suspender {
    pub fn new(
        inv: Arc<dyn Inventory>,
        db: Option<Arc<dyn ExternalDb>>,
        opts: Arc<Options>,
        clock: Clock,
    ) -> Self {
        let keys = AnnotationKeys::new(&opts.prefix);
        Self {
            inv,
            db,
            opts,
            keys,
            clock,
        }
    }

    /// Consume the work queue until cancelled or the watcher hangs up.
    /// Returns an error only on a fatal resource-list failure.
    pub async fn run(
        &self,
        mut queue: mpsc::Receiver<Namespace>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("suspender started");
        loop {
            let ns = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                item = queue.recv() => match item {
                    Some(ns) => ns,
                    None => return Ok(()),
                },
            };

            let name = ns.name_any();
            let start = Instant::now();
            debug!(namespace = %name, "namespace received from watcher");

            // racing against the token abandons the in-flight item on shutdown
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                res = self.reconcile(&ns) => res,
            };
            outcome?;

            debug!(namespace = %name, duration = ?start.elapsed(), "suspender pass ended");
        }
    }

    /// Reconcile one namespace snapshot.
    pub async fn reconcile(&self, ns: &Namespace) -> Result<()> {
        let name = ns.name_any();

        // Phase 1: resolve the state, patching the annotation if a trigger fired.
        let Some(state) = self.resolve_state(&name, ns.annotations()).await else {
            return Ok(());
        };

        // Phase 2: enumerate resources. A list failure here is fatal.
        let deployments = WorkloadKind::Deployment.list(self.inv.as_ref(), &name).await?;
        let stateful_sets = WorkloadKind::StatefulSet.list(self.inv.as_ref(), &name).await?;
        let prometheuses = WorkloadKind::Prometheus.list(self.inv.as_ref(), &name).await?;
        let cron_jobs = ScheduledKind::CronJob.list(self.inv.as_ref(), &name).await?;
        let cron_jobs_beta = ScheduledKind::CronJobBeta.list(self.inv.as_ref(), &name).await?;
        let jobs = ScheduledKind::Job.list(self.inv.as_ref(), &name).await?;
        let scaled_objects: Option<Vec<DynamicObject>> = if self.opts.keda_enabled {
            Some(
                self.inv
                    .list_dynamic(DynamicKind::ScaledObject, &name)
                    .await?,
            )
        } else {
            None
        };
        let db_clusters: Option<Vec<DbCluster>> = match &self.db {
            Some(db) => Some(db.list_db_clusters(&name).await?),
            None => None,
        };

        // Phase 3: drive every kind toward the state, concurrently.
        match state {
            DesiredState::Running => {
                let inv = self.inv.as_ref();
                let keys = &self.keys;
                let (depl, sts, prom, cj, cjb, job, keda, dbc) = tokio::join!(
                    workload::ensure_running(inv, &deployments, &name, keys),
                    workload::ensure_running(inv, &stateful_sets, &name, keys),
                    workload::ensure_running(inv, &prometheuses, &name, keys),
                    cron_job::ensure_running(inv, &cron_jobs, &name),
                    cron_job::ensure_running(inv, &cron_jobs_beta, &name),
                    cron_job::ensure_running(inv, &jobs, &name),
                    async {
                        match &scaled_objects {
                            Some(items) => scaled_object::ensure_running(inv, items, &name).await,
                            None => Ok(false),
                        }
                    },
                    async {
                        match (&self.db, &db_clusters) {
                            (Some(db), Some(clusters)) => {
                                rds::ensure_running(db.as_ref(), clusters, &name).await
                            }
                            _ => Ok(false),
                        }
                    },
                );

                let mut patched = false;
                patched |= driver_patched(depl, "deployment", &name);
                patched |= driver_patched(sts, "statefulset", &name);
                patched |= driver_patched(prom, "prometheus", &name);
                patched |= driver_patched(cj, "cronjob", &name);
                patched |= driver_patched(cjb, "cronjob (beta)", &name);
                patched |= driver_patched(job, "job", &name);
                patched |= driver_patched(keda, "scaledobject", &name);
                patched |= driver_patched(dbc, "rdscluster", &name);

                // Something had to be resumed while the namespace was already
                // flagged Running: a manual resume. Grant one extension window,
                // but never reset a budget that is already ticking.
                if patched && !ns.annotations().contains_key(&self.keys.next_suspend_time) {
                    if let Err(e) = self.grant_extension(&name).await {
                        warn!(namespace = %name, error = %e, "cannot add nextSuspendTime annotation");
                    }
                }
            }
            DesiredState::Suspended => {
                let inv = self.inv.as_ref();
                let keys = &self.keys;
                let (depl, sts, prom, cj, cjb, job, keda, dbc) = tokio::join!(
                    workload::ensure_suspended(inv, &deployments, &name, keys),
                    workload::ensure_suspended(inv, &stateful_sets, &name, keys),
                    workload::ensure_suspended(inv, &prometheuses, &name, keys),
                    cron_job::ensure_suspended(inv, &cron_jobs, &name),
                    cron_job::ensure_suspended(inv, &cron_jobs_beta, &name),
                    cron_job::ensure_suspended(inv, &jobs, &name),
                    async {
                        match &scaled_objects {
                            Some(items) => scaled_object::ensure_suspended(inv, items, &name).await,
                            None => Ok(()),
                        }
                    },
                    async {
                        match (&self.db, &db_clusters) {
                            (Some(db), Some(clusters)) => {
                                rds::ensure_suspended(db.as_ref(), clusters, &name).await
                            }
                            _ => Ok(()),
                        }
                    },
                );

                driver_done(depl, "deployment", &name);
                driver_done(sts, "statefulset", &name);
                driver_done(prom, "prometheus", &name);
                driver_done(cj, "cronjob", &name);
                driver_done(cjb, "cronjob (beta)", &name);
                driver_done(job, "job", &name);
                driver_done(keda, "scaledobject", &name);
                driver_done(dbc, "rdscluster", &name);

                // A suspended namespace has no use for an extension window.
                if ns.annotations().contains_key(&self.keys.next_suspend_time) {
                    if let Err(e) = self.clear_next_suspend(&name).await {
                        warn!(namespace = %name, error = %e, "cannot remove nextSuspendTime annotation");
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase 1: decide and, when a trigger fired, patch the annotation.
    /// `None` means skip this item.
    async fn resolve_state(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Option<DesiredState> {
        match decide_state(annotations, &self.keys, self.clock.now()) {
            StateDecision::Keep(state) => Some(state),
            StateDecision::Unrecognised(value) => {
                error!(namespace = name, state = %value, "desired state cannot be recognised");
                None
            }
            StateDecision::Transition { to, trigger } => {
                if let Err(e) = self.write_desired_state(name, to).await {
                    warn!(namespace = name, error = %e, "cannot update namespace desiredState");
                    return None;
                }
                match trigger {
                    Trigger::FirstSighting => {
                        info!(namespace = name, "newly opted-in namespace flagged Running")
                    }
                    Trigger::DailySchedule => {
                        info!(namespace = name, "suspended namespace based on daily suspend time")
                    }
                    Trigger::ExtensionExpired => {
                        info!(namespace = name, "suspended namespace based on expired extension")
                    }
                }
                Some(to)
            }
        }
    }

    async fn write_desired_state(&self, name: &str, to: DesiredState) -> Result<()> {
        retry_on_conflict(|| async move {
            let mut ns = self.inv.get_namespace(name).await?;
            ns.annotations_mut()
                .insert(self.keys.desired_state.clone(), to.to_string());
            self.inv.update_namespace(&ns).await.map(|_| ())
        })
        .await
    }

    async fn grant_extension(&self, name: &str) -> Result<()> {
        let expiry = Clock::next_suspend_time(
            self.clock.now(),
            Duration::minutes(self.opts.running_duration_min),
        );
        let expiry = expiry.as_str();
        retry_on_conflict(|| async move {
            let mut ns = self.inv.get_namespace(name).await?;
            if ns.annotations().contains_key(&self.keys.next_suspend_time) {
                return Ok(());
            }
            ns.annotations_mut()
                .insert(self.keys.next_suspend_time.clone(), expiry.to_string());
            self.inv.update_namespace(&ns).await.map(|_| ())
        })
        .await?;
        info!(namespace = name, until = %expiry, "granted manual-resume extension");
        Ok(())
    }

    async fn clear_next_suspend(&self, name: &str) -> Result<()> {
        retry_on_conflict(|| async move {
            let mut ns = self.inv.get_namespace(name).await?;
            if ns
                .annotations_mut()
                .remove(&self.keys.next_suspend_time)
                .is_none()
            {
                return Ok(());
            }
            self.inv.update_namespace(&ns).await.map(|_| ())
        })
        .await
    }
}

fn driver_patched(result: Result<bool>, kind: &str, ns: &str) -> bool {
    match result {
        Ok(patched) => patched,
        Err(e) => {
            error!(namespace = ns, kind = kind, error = %e, "running conformity checks failed");
            false
        }
    }
}

fn driver_done(result: Result<()>, kind: &str, ns: &str) {
    if let Err(e) = result {
        error!(namespace = ns, kind = kind, error = %e, "suspended conformity checks failed");
    }
}
