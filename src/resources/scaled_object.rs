//! Autoscaler driver: KEDA ScaledObjects
//!
//! A ScaledObject is paused by the presence of the
//! `autoscaling.keda.sh/paused-replicas` annotation; KEDA holds the target
//! at that replica count while the annotation exists. Suspension pins the
//! scaler at zero, resumption removes the annotation and hands control
//! back to the scaler.

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::info;

use crate::error::Result;
use crate::inventory::{retry_on_conflict, DynamicKind, Inventory};

/// KEDA pause annotation; the value is the replica count to pin.
pub const PAUSE_ANNOTATION: &str = "autoscaling.keda.sh/paused-replicas";

fn is_paused(obj: &DynamicObject) -> bool {
    obj.annotations().contains_key(PAUSE_ANNOTATION)
}

/// Unpause every paused ScaledObject. Returns whether anything was written.
pub async fn ensure_running(
    inv: &dyn Inventory,
    items: &[DynamicObject],
    ns: &str,
) -> Result<bool> {
    let mut patched = false;
    for so in items {
        if !is_paused(so) {
            continue;
        }
        let name = so.name_any();
        info!(
            namespace = ns,
            scaledobject = %name,
            "updating {name} from paused to unpaused"
        );
        let name = name.as_str();
        retry_on_conflict(|| async move {
            let mut fresh = inv.get_dynamic(DynamicKind::ScaledObject, ns, &name).await?;
            if fresh.annotations_mut().remove(PAUSE_ANNOTATION).is_none() {
                return Ok(());
            }
            inv.update_dynamic(DynamicKind::ScaledObject, ns, &fresh)
                .await
                .map(|_| ())
        })
        .await?;
        patched = true;
    }
    Ok(patched)
}

/// Pause every unpaused ScaledObject at zero replicas.
pub async fn ensure_suspended(
    inv: &dyn Inventory,
    items: &[DynamicObject],
    ns: &str,
) -> Result<()> {
    for so in items {
        if is_paused(so) {
            continue;
        }
        let name = so.name_any();
        info!(
            namespace = ns,
            scaledobject = %name,
            "updating {name} from unpaused to paused"
        );
        let name = name.as_str();
        retry_on_conflict(|| async move {
            let mut fresh = inv.get_dynamic(DynamicKind::ScaledObject, ns, &name).await?;
            if fresh.annotations().contains_key(PAUSE_ANNOTATION) {
                return Ok(());
            }
            fresh
                .annotations_mut()
                .insert(PAUSE_ANNOTATION.to_string(), "0".to_string());
            inv.update_dynamic(DynamicKind::ScaledObject, ns, &fresh)
                .await
                .map(|_| ())
        })
        .await?;
    }
    Ok(())
}
