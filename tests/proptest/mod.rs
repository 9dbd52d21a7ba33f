// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests
//!
//! These verify that:
//! 1. The phase-1 state decision never panics, whatever the annotations hold
//! 2. Malformed time strings are rejected as errors, never panics
//! 3. Parsed kitchen times always land inside one day
//! 4. The state decision is deterministic

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use proptest::prelude::*;

use ns_suspender::suspender::{decide_state, StateDecision};
use ns_suspender::{AnnotationKeys, Clock, DesiredState};

fn keys() -> AnnotationKeys {
    AnnotationKeys::new("ns-suspender/")
}

fn noon() -> DateTime<Tz> {
    chrono_tz::UTC.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

/// Strategy for annotation maps mixing well-formed and garbage values.
fn annotation_maps() -> impl Strategy<Value = BTreeMap<String, String>> {
    let state = prop_oneof![
        Just("Running".to_string()),
        Just("Suspended".to_string()),
        "\\PC*",
    ];
    let daily = prop_oneof![Just("9:00PM".to_string()), "\\PC*"];
    let next = prop_oneof![
        Just("Mon, 01 Jan 2024 00:00:00 +0000".to_string()),
        "\\PC*",
    ];
    (
        proptest::option::of(state),
        proptest::option::of(daily),
        proptest::option::of(next),
    )
        .prop_map(|(state, daily, next)| {
            let mut map = BTreeMap::new();
            if let Some(v) = state {
                map.insert("ns-suspender/desiredState".to_string(), v);
            }
            if let Some(v) = daily {
                map.insert("ns-suspender/dailySuspendTime".to_string(), v);
            }
            if let Some(v) = next {
                map.insert("ns-suspender/nextSuspendTime".to_string(), v);
            }
            map
        })
}

proptest! {
    #[test]
    fn decide_state_never_panics(annotations in annotation_maps()) {
        let _ = decide_state(&annotations, &keys(), noon());
    }

    #[test]
    fn decide_state_is_deterministic(annotations in annotation_maps()) {
        let first = decide_state(&annotations, &keys(), noon());
        let second = decide_state(&annotations, &keys(), noon());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn absent_state_always_means_a_running_transition(
        daily in proptest::option::of("\\PC*"),
    ) {
        let mut annotations = BTreeMap::new();
        if let Some(v) = daily {
            annotations.insert("ns-suspender/dailySuspendTime".to_string(), v);
        }
        let decision = decide_state(&annotations, &keys(), noon());
        let is_running_transition = matches!(
            decision,
            StateDecision::Transition { to: DesiredState::Running, .. }
        );
        prop_assert!(is_running_transition);
    }

    #[test]
    fn arbitrary_time_strings_never_panic(value in "\\PC*") {
        let _ = Clock::minutes_of_day(noon(), &value);
        let _ = Clock::parse_next_suspend(&value);
    }

    #[test]
    fn parsed_kitchen_times_stay_inside_one_day(h in 1u32..=12, m in 0u32..60, pm in any::<bool>()) {
        let value = format!("{}:{:02}{}", h, m, if pm { "PM" } else { "AM" });
        let (now, at) = Clock::minutes_of_day(noon(), &value).unwrap();
        prop_assert!(at < 24 * 60);
        prop_assert!(now < 24 * 60);
    }
}
