//! Tests for the uniform resource views used by the drivers

use ns_suspender::resources::{ScheduledJob, Workload};

use crate::common::fixtures::{
    cron_job, cron_job_beta, deployment, job, prometheus, scaled_object, stateful_set,
};

#[test]
fn typed_workloads_expose_replicas() {
    let d = Workload::Deployment(deployment("web", "g1", 3, &[]));
    assert_eq!(d.replicas(), Some(3));
    assert_eq!(d.name(), "web");

    let s = Workload::StatefulSet(stateful_set("db", "g1", 1, &[]));
    assert_eq!(s.replicas(), Some(1));
}

#[test]
fn prometheus_workloads_expose_replicas() {
    let p = Workload::Prometheus(prometheus("main", "g1", 2, None));
    assert_eq!(p.replicas(), Some(2));
    assert_eq!(p.name(), "main");
}

#[test]
fn set_replicas_round_trips_on_every_kind() {
    let mut d = Workload::Deployment(deployment("web", "g1", 3, &[]));
    d.set_replicas(0);
    assert_eq!(d.replicas(), Some(0));

    let mut s = Workload::StatefulSet(stateful_set("db", "g1", 2, &[]));
    s.set_replicas(0);
    assert_eq!(s.replicas(), Some(0));

    let mut p = Workload::Prometheus(prometheus("main", "g1", 2, None));
    p.set_replicas(5);
    assert_eq!(p.replicas(), Some(5));
}

#[test]
fn annotations_mut_initialises_a_missing_map() {
    let mut d = Workload::Deployment(deployment("web", "g1", 3, &[]));
    assert!(d.annotations().is_empty());
    d.annotations_mut()
        .insert("ns-suspender/originalReplicas".into(), "3".into());
    assert_eq!(
        d.annotations().get("ns-suspender/originalReplicas"),
        Some(&"3".to_string())
    );

    let mut p = Workload::Prometheus(prometheus("main", "g1", 2, None));
    assert!(p.annotations().is_empty());
    p.annotations_mut()
        .insert("ns-suspender/originalReplicas".into(), "2".into());
    assert_eq!(
        p.annotations().get("ns-suspender/originalReplicas"),
        Some(&"2".to_string())
    );
}

#[test]
fn existing_memory_annotations_are_readable() {
    let d = Workload::Deployment(deployment(
        "web",
        "g1",
        0,
        &[("ns-suspender/originalReplicas", "4")],
    ));
    assert_eq!(
        d.annotations().get("ns-suspender/originalReplicas"),
        Some(&"4".to_string())
    );

    let p = Workload::Prometheus(prometheus("main", "g1", 0, Some("2")));
    assert_eq!(
        p.annotations().get("ns-suspender/originalReplicas"),
        Some(&"2".to_string())
    );
}

#[test]
fn scheduled_jobs_expose_the_suspend_flag() {
    assert!(ScheduledJob::CronJob(cron_job("nightly", "g1", Some(true))).suspended());
    assert!(!ScheduledJob::CronJob(cron_job("nightly", "g1", Some(false))).suspended());
    assert!(ScheduledJob::Job(job("once", "g1", Some(true))).suspended());
    assert!(ScheduledJob::CronJobBeta(cron_job_beta("legacy", "g1", true)).suspended());
}

#[test]
fn an_unset_suspend_flag_defaults_to_running() {
    assert!(!ScheduledJob::CronJob(cron_job("nightly", "g1", None)).suspended());
    assert!(!ScheduledJob::Job(job("once", "g1", None)).suspended());
}

#[test]
fn set_suspended_round_trips_on_every_variant() {
    let mut cj = ScheduledJob::CronJob(cron_job("nightly", "g1", Some(false)));
    cj.set_suspended(true);
    assert!(cj.suspended());

    let mut beta = ScheduledJob::CronJobBeta(cron_job_beta("legacy", "g1", false));
    beta.set_suspended(true);
    assert!(beta.suspended());

    let mut j = ScheduledJob::Job(job("once", "g1", Some(true)));
    j.set_suspended(false);
    assert!(!j.suspended());
}

#[test]
fn scaled_object_fixture_matches_the_pause_contract() {
    use kube::ResourceExt;
    use ns_suspender::resources::scaled_object::PAUSE_ANNOTATION;

    let paused = scaled_object("scaler", "g1", true);
    assert_eq!(
        paused.annotations().get(PAUSE_ANNOTATION),
        Some(&"0".to_string())
    );
    let unpaused = scaled_object("scaler", "g1", false);
    assert!(!unpaused.annotations().contains_key(PAUSE_ANNOTATION));
}
