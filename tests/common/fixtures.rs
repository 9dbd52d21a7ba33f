//! Test fixtures for namespaces and the resources the suspender drives
//!
//! Builders produce minimal but well-formed objects; annotation maps are
//! only materialised when at least one annotation is requested, so tests
//! exercise the missing-map paths the same way a bare manifest would.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::core::ObjectMeta;

pub const PREFIX: &str = "ns-suspender/";
pub const CONTROLLER: &str = "ns-suspender";

fn annotation_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn meta(name: &str, ns: Option<&str>, annotations: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: ns.map(str::to_string),
        annotations: annotation_map(annotations),
        ..Default::default()
    }
}

/// A namespace with the given annotations.
pub fn namespace(name: &str, annotations: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: meta(name, None, annotations),
        ..Default::default()
    }
}

/// A namespace opted in to the test controller, plus extra annotations.
pub fn opted_in_namespace(name: &str, extra: &[(&str, &str)]) -> Namespace {
    let opt_in = format!("{PREFIX}controllerName");
    let mut pairs: Vec<(&str, &str)> = vec![(opt_in.as_str(), CONTROLLER)];
    pairs.extend_from_slice(extra);
    namespace(name, &pairs)
}

pub fn deployment(name: &str, ns: &str, replicas: i32, annotations: &[(&str, &str)]) -> Deployment {
    Deployment {
        metadata: meta(name, Some(ns), annotations),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn stateful_set(
    name: &str,
    ns: &str,
    replicas: i32,
    annotations: &[(&str, &str)],
) -> StatefulSet {
    StatefulSet {
        metadata: meta(name, Some(ns), annotations),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn cron_job(name: &str, ns: &str, suspend: Option<bool>) -> CronJob {
    CronJob {
        metadata: meta(name, Some(ns), &[]),
        spec: Some(CronJobSpec {
            suspend,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn job(name: &str, ns: &str, suspend: Option<bool>) -> Job {
    Job {
        metadata: meta(name, Some(ns), &[]),
        spec: Some(JobSpec {
            suspend,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A `batch/v1beta1` CronJob as served through the dynamic API.
pub fn cron_job_beta(name: &str, ns: &str, suspend: bool) -> DynamicObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "batch/v1beta1",
        "kind": "CronJob",
        "metadata": { "name": name, "namespace": ns },
        "spec": { "schedule": "0 0 * * *", "suspend": suspend }
    }))
    .expect("valid beta cronjob fixture")
}

/// A KEDA ScaledObject, optionally carrying the pause annotation.
pub fn scaled_object(name: &str, ns: &str, paused: bool) -> DynamicObject {
    let mut value = serde_json::json!({
        "apiVersion": "keda.sh/v1alpha1",
        "kind": "ScaledObject",
        "metadata": { "name": name, "namespace": ns },
        "spec": { "scaleTargetRef": { "name": "web" } }
    });
    if paused {
        value["metadata"]["annotations"] =
            serde_json::json!({ "autoscaling.keda.sh/paused-replicas": "0" });
    }
    serde_json::from_value(value).expect("valid scaledobject fixture")
}

/// A Prometheus CR with the given replica count; no annotations map unless
/// memory is requested.
pub fn prometheus(name: &str, ns: &str, replicas: i32, original: Option<&str>) -> DynamicObject {
    let mut value = serde_json::json!({
        "apiVersion": "monitoring.coreos.com/v1",
        "kind": "Prometheus",
        "metadata": { "name": name, "namespace": ns },
        "spec": { "replicas": replicas }
    });
    if let Some(count) = original {
        value["metadata"]["annotations"][format!("{PREFIX}originalReplicas").as_str()] =
            serde_json::json!(count);
    }
    serde_json::from_value(value).expect("valid prometheus fixture")
}
