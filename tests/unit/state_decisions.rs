//! Scenario tests for the phase-1 state decision

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;
use kube::ResourceExt;

use ns_suspender::suspender::{decide_state, StateDecision, Trigger};
use ns_suspender::{AnnotationKeys, DesiredState};

use crate::common::fixtures::{namespace, opted_in_namespace};

fn keys() -> AnnotationKeys {
    AnnotationKeys::new("ns-suspender/")
}

fn at(h: u32, m: u32) -> DateTime<Tz> {
    chrono_tz::Europe::Paris
        .with_ymd_and_hms(2024, 6, 3, h, m, 0)
        .unwrap()
}

#[test]
fn first_sighting_flags_running() {
    let ns = opted_in_namespace("g1", &[]);
    let decision = decide_state(ns.annotations(), &keys(), at(9, 0));
    assert_eq!(
        decision,
        StateDecision::Transition {
            to: DesiredState::Running,
            trigger: Trigger::FirstSighting
        }
    );
}

#[test]
fn daily_suspend_time_equal_to_now_fires() {
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            ("ns-suspender/dailySuspendTime", "9:00PM"),
        ],
    );
    let decision = decide_state(ns.annotations(), &keys(), at(21, 0));
    assert_eq!(
        decision,
        StateDecision::Transition {
            to: DesiredState::Suspended,
            trigger: Trigger::DailySchedule
        }
    );
}

#[test]
fn one_minute_before_the_daily_time_holds() {
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            ("ns-suspender/dailySuspendTime", "9:00PM"),
        ],
    );
    let decision = decide_state(ns.annotations(), &keys(), at(20, 59));
    assert_eq!(decision, StateDecision::Keep(DesiredState::Running));
}

#[test]
fn next_suspend_time_equal_to_now_does_not_fire() {
    let now = at(15, 0);
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            ("ns-suspender/nextSuspendTime", &now.to_rfc2822()),
        ],
    );
    assert_eq!(
        decide_state(ns.annotations(), &keys(), now),
        StateDecision::Keep(DesiredState::Running)
    );
}

#[test]
fn next_suspend_time_in_the_past_fires() {
    let now = at(15, 0);
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            (
                "ns-suspender/nextSuspendTime",
                &(now - Duration::minutes(1)).to_rfc2822(),
            ),
        ],
    );
    assert_eq!(
        decide_state(ns.annotations(), &keys(), now),
        StateDecision::Transition {
            to: DesiredState::Suspended,
            trigger: Trigger::ExtensionExpired
        }
    );
}

#[test]
fn the_daily_trigger_wins_over_the_extension_trigger() {
    let now = at(22, 30);
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            ("ns-suspender/dailySuspendTime", "9:00PM"),
            (
                "ns-suspender/nextSuspendTime",
                &(now - Duration::minutes(10)).to_rfc2822(),
            ),
        ],
    );
    assert_eq!(
        decide_state(ns.annotations(), &keys(), now),
        StateDecision::Transition {
            to: DesiredState::Suspended,
            trigger: Trigger::DailySchedule
        }
    );
}

#[test]
fn a_future_extension_shields_a_resumed_namespace() {
    // Past the daily time, but no daily annotation; extension still running.
    let now = at(22, 30);
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            (
                "ns-suspender/nextSuspendTime",
                &(now + Duration::minutes(90)).to_rfc2822(),
            ),
        ],
    );
    assert_eq!(
        decide_state(ns.annotations(), &keys(), now),
        StateDecision::Keep(DesiredState::Running)
    );
}

#[test]
fn an_unrecognised_state_is_reported_verbatim() {
    let ns = opted_in_namespace("g1", &[("ns-suspender/desiredState", "frozen")]);
    assert_eq!(
        decide_state(ns.annotations(), &keys(), at(9, 0)),
        StateDecision::Unrecognised("frozen".to_string())
    );
}

#[test]
fn suspended_namespaces_stay_suspended() {
    let ns = opted_in_namespace("g1", &[("ns-suspender/desiredState", "Suspended")]);
    assert_eq!(
        decide_state(ns.annotations(), &keys(), at(9, 0)),
        StateDecision::Keep(DesiredState::Suspended)
    );
}

#[test]
fn malformed_trigger_annotations_keep_the_namespace_running() {
    let ns = opted_in_namespace(
        "g1",
        &[
            ("ns-suspender/desiredState", "Running"),
            ("ns-suspender/dailySuspendTime", "21:00"),
            ("ns-suspender/nextSuspendTime", "yesterday"),
        ],
    );
    assert_eq!(
        decide_state(ns.annotations(), &keys(), at(23, 0)),
        StateDecision::Keep(DesiredState::Running)
    );
}

#[test]
fn a_different_prefix_sees_no_state() {
    // Same annotations under another deployment's prefix are invisible.
    let ns = namespace("g1", &[("other/desiredState", "Suspended")]);
    assert_eq!(
        decide_state(ns.annotations(), &keys(), at(9, 0)),
        StateDecision::Transition {
            to: DesiredState::Running,
            trigger: Trigger::FirstSighting
        }
    );
}
