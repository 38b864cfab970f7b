//! Configuration for the control plane.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

use crate::compress::CompressorPoolConfig;
use crate::model::ResourceList;

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on for HTTP connections.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Whether we're in development mode.
    pub dev_mode: bool,

    /// Groups granted every global permission.
    pub admin_groups: Vec<String>,

    /// Submission and lifecycle knobs.
    pub submission: SubmissionConfig,

    /// Pod defaulting and validation knobs.
    pub scheduling: SchedulingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("CONVOY_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("CONVOY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("CONVOY_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let admin_groups = std::env::var("CONVOY_ADMIN_GROUPS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|_| vec!["admins".to_string()]);

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            admin_groups,
            submission: SubmissionConfig::from_env(),
            scheduling: SchedulingConfig::default(),
        })
    }
}

/// Knobs governing job submission and cancellation.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    /// Upper bound on queued jobs per queue; values <= 0 disable the quota.
    pub default_queued_jobs_limit: i64,

    /// Whether submitting to a missing queue provisions it on the fly.
    pub auto_create_queues: bool,

    /// Priority factor assigned to auto-provisioned queues.
    pub default_priority_factor: f64,

    /// Number of jobs loaded and deleted per cancellation batch.
    pub cancel_jobs_batch_size: usize,

    /// Remaining-deadline threshold checked between cancellation batches.
    pub cancel_deadline_leeway: Duration,

    /// Sizing for the shared compressor pool.
    pub compressor_pool: CompressorPoolConfig,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            default_queued_jobs_limit: 0,
            auto_create_queues: false,
            default_priority_factor: 1.0,
            cancel_jobs_batch_size: 1000,
            cancel_deadline_leeway: Duration::from_secs(1),
            compressor_pool: CompressorPoolConfig::default(),
        }
    }
}

impl SubmissionConfig {
    /// Load submission knobs from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_queued_jobs_limit = env_parse("CONVOY_QUEUED_JOBS_LIMIT")
            .unwrap_or(defaults.default_queued_jobs_limit);

        let auto_create_queues = std::env::var("CONVOY_AUTO_CREATE_QUEUES")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(defaults.auto_create_queues);

        let default_priority_factor = env_parse("CONVOY_DEFAULT_PRIORITY_FACTOR")
            .unwrap_or(defaults.default_priority_factor);

        let cancel_jobs_batch_size =
            env_parse("CONVOY_CANCEL_BATCH_SIZE").unwrap_or(defaults.cancel_jobs_batch_size);

        let cancel_deadline_leeway = env_parse("CONVOY_CANCEL_DEADLINE_LEEWAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.cancel_deadline_leeway);

        Self {
            default_queued_jobs_limit,
            auto_create_queues,
            default_priority_factor,
            cancel_jobs_batch_size,
            cancel_deadline_leeway,
            compressor_pool: CompressorPoolConfig::default(),
        }
    }
}

/// Defaulting and validation applied to submitted pod specs.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Resource values merged into containers that specify neither a request
    /// nor a limit for the resource.
    pub default_job_limits: ResourceList,

    /// Annotations added to submitted items when the key is absent.
    pub default_annotations: BTreeMap<String, String>,

    /// Applied to pod specs that carry no active deadline.
    pub default_active_deadline_seconds: Option<i64>,

    /// Applied to pod specs that carry no termination grace period.
    pub default_termination_grace_period_seconds: Option<i64>,

    /// Validation bounds on the termination grace period.
    pub min_termination_grace_period_seconds: Option<i64>,
    pub max_termination_grace_period_seconds: Option<i64>,

    /// Per-container request floor.
    pub min_job_resources: ResourceList,

    /// Ceiling on the serialized size of a job's pod specs.
    pub max_pod_spec_size_bytes: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_job_limits: ResourceList::new(),
            default_annotations: BTreeMap::new(),
            default_active_deadline_seconds: None,
            default_termination_grace_period_seconds: None,
            min_termination_grace_period_seconds: None,
            max_termination_grace_period_seconds: None,
            min_job_resources: ResourceList::new(),
            max_pod_spec_size_bytes: 64 * 1024,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
