//! Replica driver: Deployments, StatefulSets and Prometheus CRs
//!
//! The three kinds share one contract: an integer `spec.replicas` plus the
//! controller-owned `originalReplicas` annotation. Suspending scales to
//! zero and memorises the count observed at write time; resuming restores
//! the memorised count and removes the annotation so a later manual scale
//! to zero is not "restored" to a stale value.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, warn};

use crate::annotations::AnnotationKeys;
use crate::error::{Error, Result};
use crate::inventory::{retry_on_conflict, DynamicKind, Inventory};

/// The replica-bearing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    Prometheus,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
            WorkloadKind::Prometheus => "prometheus",
        }
    }

    pub async fn list(&self, inv: &dyn Inventory, ns: &str) -> Result<Vec<Workload>> {
        let items = match self {
            WorkloadKind::Deployment => inv
                .list_deployments(ns)
                .await?
                .into_iter()
                .map(Workload::Deployment)
                .collect(),
            WorkloadKind::StatefulSet => inv
                .list_stateful_sets(ns)
                .await?
                .into_iter()
                .map(Workload::StatefulSet)
                .collect(),
            WorkloadKind::Prometheus => inv
                .list_dynamic(DynamicKind::Prometheus, ns)
                .await?
                .into_iter()
                .map(Workload::Prometheus)
                .collect(),
        };
        Ok(items)
    }
}

/// Uniform view over one replica-bearing resource.
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    Prometheus(DynamicObject),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
            Workload::Prometheus(_) => WorkloadKind::Prometheus,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Workload::Deployment(o) => o.name_any(),
            Workload::StatefulSet(o) => o.name_any(),
            Workload::Prometheus(o) => o.name_any(),
        }
    }

    /// `spec.replicas`, or `None` when the field is unset. A workload
    /// without an explicit count is left alone by both operations.
    pub fn replicas(&self) -> Option<i32> {
        match self {
            Workload::Deployment(o) => o.spec.as_ref().and_then(|s| s.replicas),
            Workload::StatefulSet(o) => o.spec.as_ref().and_then(|s| s.replicas),
            Workload::Prometheus(o) => o.data["spec"]["replicas"].as_i64().map(|n| n as i32),
        }
    }

    pub fn set_replicas(&mut self, replicas: i32) {
        match self {
            Workload::Deployment(o) => {
                if let Some(spec) = o.spec.as_mut() {
                    spec.replicas = Some(replicas);
                }
            }
            Workload::StatefulSet(o) => {
                if let Some(spec) = o.spec.as_mut() {
                    spec.replicas = Some(replicas);
                }
            }
            Workload::Prometheus(o) => {
                o.data["spec"]["replicas"] = json!(replicas);
            }
        }
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        match self {
            Workload::Deployment(o) => o.annotations(),
            Workload::StatefulSet(o) => o.annotations(),
            Workload::Prometheus(o) => o.annotations(),
        }
    }

    /// Mutable annotations, initialising the map when the manifest has none.
    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            Workload::Deployment(o) => o.annotations_mut(),
            Workload::StatefulSet(o) => o.annotations_mut(),
            Workload::Prometheus(o) => o.annotations_mut(),
        }
    }

    async fn fetch(inv: &dyn Inventory, kind: WorkloadKind, ns: &str, name: &str) -> Result<Self> {
        let fresh = match kind {
            WorkloadKind::Deployment => Workload::Deployment(inv.get_deployment(ns, name).await?),
            WorkloadKind::StatefulSet => {
                Workload::StatefulSet(inv.get_stateful_set(ns, name).await?)
            }
            WorkloadKind::Prometheus => {
                Workload::Prometheus(inv.get_dynamic(DynamicKind::Prometheus, ns, name).await?)
            }
        };
        Ok(fresh)
    }

    async fn update(&self, inv: &dyn Inventory, ns: &str) -> Result<()> {
        match self {
            Workload::Deployment(o) => inv.update_deployment(ns, o).await.map(|_| ()),
            Workload::StatefulSet(o) => inv.update_stateful_set(ns, o).await.map(|_| ()),
            Workload::Prometheus(o) => inv
                .update_dynamic(DynamicKind::Prometheus, ns, o)
                .await
                .map(|_| ()),
        }
    }
}

/// Remembered replica count of a workload currently at zero: the parsed
/// `originalReplicas` annotation, or 0 when the annotation is absent (the
/// workload was always at zero and owns no memory).
fn remembered_replicas(w: &Workload, keys: &AnnotationKeys) -> Result<i32> {
    match w.annotations().get(&keys.original_replicas) {
        None => Ok(0),
        Some(value) => value.parse::<i32>().map_err(|source| Error::ReplicasParseError {
            value: value.clone(),
            source,
        }),
    }
}

/// Scale every workload that the controller previously scaled to zero back
/// to its remembered count. Returns whether anything was written.
pub async fn ensure_running(
    inv: &dyn Inventory,
    items: &[Workload],
    ns: &str,
    keys: &AnnotationKeys,
) -> Result<bool> {
    let mut patched = false;
    for w in items {
        if w.replicas() != Some(0) {
            continue;
        }
        let original = match remembered_replicas(w, keys) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    namespace = ns,
                    kind = w.kind().as_str(),
                    name = %w.name(),
                    error = %e,
                    "cannot read replica memory"
                );
                continue;
            }
        };
        if original == 0 {
            continue;
        }

        let kind = w.kind();
        let name = w.name();
        info!(
            namespace = ns,
            kind = kind.as_str(),
            name = %name,
            "scaling {name} from 0 to {original} replicas"
        );
        let name = name.as_str();
        let wrote = retry_on_conflict(|| async move {
            let mut fresh = Workload::fetch(inv, kind, ns, &name).await?;
            if fresh.replicas() != Some(0) {
                // someone else already scaled it up; not ours to touch
                return Ok(false);
            }
            fresh.set_replicas(original);
            fresh.annotations_mut().remove(&keys.original_replicas);
            fresh.update(inv, ns).await?;
            Ok(true)
        })
        .await?;
        patched |= wrote;
    }
    Ok(patched)
}

/// Scale every workload with a nonzero count down to zero, memorising the
/// count observed at write time.
pub async fn ensure_suspended(
    inv: &dyn Inventory,
    items: &[Workload],
    ns: &str,
    keys: &AnnotationKeys,
) -> Result<()> {
    for w in items {
        let Some(replicas) = w.replicas() else {
            continue;
        };
        if replicas == 0 {
            continue;
        }

        let kind = w.kind();
        let name = w.name();
        info!(
            namespace = ns,
            kind = kind.as_str(),
            name = %name,
            "scaling {name} from {replicas} to 0 replicas"
        );
        let name = name.as_str();
        retry_on_conflict(|| async move {
            let mut fresh = Workload::fetch(inv, kind, ns, &name).await?;
            let Some(current) = fresh.replicas() else {
                return Ok(());
            };
            if current == 0 {
                // raced with another suspender pass; nothing to memorise
                return Ok(());
            }
            fresh
                .annotations_mut()
                .insert(keys.original_replicas.clone(), current.to_string());
            fresh.set_replicas(0);
            fresh.update(inv, ns).await
        })
        .await?;
    }
    Ok(())
}
