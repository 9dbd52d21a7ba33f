//! Watcher: periodic namespace inventory and dispatch
//!
//! Enumerates all namespaces, filters down to the ones opted in to this
//! controller instance, and hands a snapshot of each to the suspender
//! through the bounded work queue. The send blocks when the queue is full,
//! which is the backpressure that paces inventory against reconciliation.
//!
//! A failed namespace list is fatal: a controller that cannot see the
//! cluster must not make decisions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::annotations::{AnnotationKeys, DesiredState};
use crate::config::Options;
use crate::error::Result;
use crate::health::HealthState;
use crate::inventory::Inventory;

/// Capacity of the work queue between watcher and suspender.
pub const QUEUE_CAPACITY: usize = 50;

/// Tallies of one inventory pass.
#[derive(Debug, Default, PartialEq, Eq)]
struct PassTally {
    enqueued: i64,
    running: i64,
    suspended: i64,
    unknown: i64,
}

/// Run inventory passes until cancelled. Returns an error only on a fatal
/// list failure.
pub async fn run_watcher(
    inv: Arc<dyn Inventory>,
    queue: mpsc::Sender<Namespace>,
    opts: Arc<Options>,
    health: Arc<HealthState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("watcher started");
    let keys = AnnotationKeys::new(&opts.prefix);

    let mut inventory_id: u64 = 0;
    loop {
        let start = Instant::now();
        debug!(inventory_id, "starting new namespaces inventory");

        let Some(tally) = run_pass(inv.as_ref(), &queue, &opts, &keys, &shutdown).await? else {
            return Ok(());
        };
        health.metrics.record_pass(
            tally.enqueued,
            tally.running,
            tally.suspended,
            tally.unknown,
        );
        health.set_ready(true).await;

        debug!(
            inventory_id,
            enqueued = tally.enqueued,
            running = tally.running,
            suspended = tally.suspended,
            unknown = tally.unknown,
            duration = ?start.elapsed(),
            "namespaces inventory ended"
        );
        inventory_id += 1;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            _ = sleep(Duration::from_secs(opts.watcher_idle)) => {}
        }
    }
}

/// One inventory pass. Returns `None` when cancelled mid-pass or when the
/// suspender is gone.
async fn run_pass(
    inv: &dyn Inventory,
    queue: &mpsc::Sender<Namespace>,
    opts: &Options,
    keys: &AnnotationKeys,
    shutdown: &CancellationToken,
) -> Result<Option<PassTally>> {
    let namespaces = inv.list_namespaces().await?;

    let mut tally = PassTally::default();
    for ns in namespaces {
        let name = ns.name_any();
        {
            let annotations = ns.annotations();
            if annotations.get(&keys.controller_name) != Some(&opts.controller_name) {
                continue;
            }
            match keys.desired_state_of(annotations) {
                Some(Ok(DesiredState::Running)) => tally.running += 1,
                Some(Ok(DesiredState::Suspended)) => tally.suspended += 1,
                Some(Err(_)) => tally.unknown += 1,
                None => {
                    warn!(namespace = %name, "desiredState annotation not found");
                    tally.unknown += 1;
                }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(None),
            res = queue.send(ns) => {
                if res.is_err() {
                    // the suspender hung up; nothing left to feed
                    return Ok(None);
                }
            }
        }
        debug!(namespace = %name, "namespace sent to suspender");
        tally.enqueued += 1;
    }

    Ok(Some(tally))
}
