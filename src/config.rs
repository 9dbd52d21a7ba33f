//! Process configuration
//!
//! All options are immutable after startup and passed by reference; there
//! is no shared mutable configuration state.

use clap::Parser;

/// Suspend and resume opted-in namespaces on time-of-day policies and
/// running budgets.
#[derive(Parser, Debug, Clone)]
#[command(name = "ns-suspender", version, about)]
pub struct Options {
    /// Log severity threshold (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "NS_SUSPENDER_LOG_LEVEL")]
    pub log_level: String,

    /// IANA timezone used to evaluate dailySuspendTime
    #[arg(long, default_value = "Europe/Paris", env = "NS_SUSPENDER_TIMEZONE")]
    pub timezone: String,

    /// Prefix prepended to all controller-owned annotation keys
    #[arg(long, default_value = "ns-suspender/", env = "NS_SUSPENDER_PREFIX")]
    pub prefix: String,

    /// Opt-in identity compared against the controllerName annotation
    #[arg(long, default_value = "ns-suspender", env = "NS_SUSPENDER_CONTROLLER_NAME")]
    pub controller_name: String,

    /// Length of the post-manual-resume extension window, in minutes
    #[arg(long, default_value_t = 240, env = "NS_SUSPENDER_RUNNING_DURATION_MIN")]
    pub running_duration_min: i64,

    /// Seconds between namespace inventory passes
    #[arg(long, default_value_t = 15, env = "NS_SUSPENDER_WATCHER_IDLE")]
    pub watcher_idle: u64,

    /// Suppress Kubernetes API deprecation warnings in the log output
    #[arg(long, default_value_t = false)]
    pub no_kube_warnings: bool,

    /// Reconcile KEDA ScaledObjects (requires the KEDA CRDs)
    #[arg(long, default_value_t = false)]
    pub keda_enabled: bool,

    /// Reconcile AWS RDS clusters tagged with the namespace name
    #[arg(long, default_value_t = false)]
    pub rds_enabled: bool,

    /// Route all writes through the Kubernetes dry-run mode
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
