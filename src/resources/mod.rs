pub mod cron_job;
pub mod rds;
pub mod scaled_object;
pub mod workload;

pub use cron_job::{ScheduledJob, ScheduledKind};
pub use rds::{AwsRds, DbCluster, ExternalDb};
pub use workload::{Workload, WorkloadKind};
