//! External DB driver: AWS RDS clusters
//!
//! RDS clusters are associated to a namespace by a `namespace` tag on the
//! cluster. Start and stop are asynchronous on the AWS side; the driver
//! fires the call and lets a later pass observe the settled status. A
//! status string with the `stop` prefix (`stopped`, `stopping`) counts as
//! suspended.

use async_trait::async_trait;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

/// Tag key linking a DB cluster to its namespace.
pub const NAMESPACE_TAG: &str = "namespace";

/// Status prefix of a stopped or stopping cluster.
const STOPPED_PREFIX: &str = "stop";

/// Snapshot of one managed DB cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCluster {
    pub identifier: String,
    pub status: String,
}

impl DbCluster {
    pub fn is_stopped(&self) -> bool {
        self.status.starts_with(STOPPED_PREFIX)
    }
}

/// The managed-database operations the suspender needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExternalDb: Send + Sync {
    /// DB clusters tagged with the given namespace.
    async fn list_db_clusters(&self, ns: &str) -> Result<Vec<DbCluster>>;
    async fn start_db_cluster(&self, identifier: &str) -> Result<()>;
    async fn stop_db_cluster(&self, identifier: &str) -> Result<()>;
}

/// Real implementation backed by the AWS SDK.
pub struct AwsRds {
    client: aws_sdk_rds::Client,
}

impl AwsRds {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_rds::Client::new(&config),
        }
    }
}

#[async_trait]
impl ExternalDb for AwsRds {
    async fn list_db_clusters(&self, ns: &str) -> Result<Vec<DbCluster>> {
        let out = self
            .client
            .describe_db_clusters()
            .send()
            .await
            .map_err(|e| Error::RdsError(e.to_string()))?;

        let clusters = out
            .db_clusters()
            .iter()
            .filter(|c| {
                c.tag_list()
                    .iter()
                    .any(|t| t.key() == Some(NAMESPACE_TAG) && t.value() == Some(ns))
            })
            .filter_map(|c| {
                Some(DbCluster {
                    identifier: c.db_cluster_identifier()?.to_string(),
                    status: c.status()?.to_string(),
                })
            })
            .collect();
        Ok(clusters)
    }

    async fn start_db_cluster(&self, identifier: &str) -> Result<()> {
        self.client
            .start_db_cluster()
            .db_cluster_identifier(identifier)
            .send()
            .await
            .map_err(|e| Error::RdsError(e.to_string()))?;
        Ok(())
    }

    async fn stop_db_cluster(&self, identifier: &str) -> Result<()> {
        self.client
            .stop_db_cluster()
            .db_cluster_identifier(identifier)
            .send()
            .await
            .map_err(|e| Error::RdsError(e.to_string()))?;
        Ok(())
    }
}

/// Start every stopped cluster. Returns whether anything was started.
pub async fn ensure_running(
    db: &dyn ExternalDb,
    clusters: &[DbCluster],
    ns: &str,
) -> Result<bool> {
    let mut patched = false;
    for c in clusters {
        debug!(namespace = ns, rdscluster = %c.identifier, status = %c.status, "running check");
        if c.is_stopped() {
            info!(namespace = ns, rdscluster = %c.identifier, "starting rds cluster");
            db.start_db_cluster(&c.identifier).await?;
            patched = true;
        }
    }
    Ok(patched)
}

/// Stop every cluster that is not already stopped or stopping.
pub async fn ensure_suspended(
    db: &dyn ExternalDb,
    clusters: &[DbCluster],
    ns: &str,
) -> Result<()> {
    for c in clusters {
        debug!(namespace = ns, rdscluster = %c.identifier, status = %c.status, "suspended check");
        if !c.is_stopped() {
            info!(namespace = ns, rdscluster = %c.identifier, "stopping rds cluster");
            db.stop_db_cluster(&c.identifier).await?;
        }
    }
    Ok(())
}
