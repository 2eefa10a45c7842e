// gan-core/src/cluster/resolver.rs

use std::fmt;

use super::spec::{ClusterConfig, ClusterSpec};
use crate::error::{Result, TrainError};

pub const PS_JOB: &str = "ps";
pub const MASTER_JOB: &str = "master";
pub const WORKER_JOB: &str = "worker";

/// What this process does in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRole {
    /// Single-process run; trains and evaluates with no cluster server.
    Chief,
    /// Serves parameters and never trains.
    ParameterServer,
    /// Distributed trainer. The `master` task is the chief.
    Worker { is_chief: bool },
}

impl ClusterRole {
    pub fn is_chief(&self) -> bool {
        matches!(self, Self::Chief | Self::Worker { is_chief: true })
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chief => f.write_str("local chief"),
            Self::ParameterServer => f.write_str(PS_JOB),
            Self::Worker { is_chief: true } => f.write_str(MASTER_JOB),
            Self::Worker { is_chief: false } => f.write_str(WORKER_JOB),
        }
    }
}

/// A validated distributed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub spec: ClusterSpec,
    pub job_name: String,
    pub task_index: u32,
    pub role: ClusterRole,
}

impl TaskAssignment {
    /// This task's own address from the cluster spec.
    pub fn address(&self) -> &str {
        self.spec
            .task_address(&self.job_name, self.task_index)
            .unwrap_or_default()
    }

    /// Number of input shards: one per training task (`master` and `worker`).
    pub fn shard_count(&self) -> u32 {
        (self.spec.num_tasks(MASTER_JOB) + self.spec.num_tasks(WORKER_JOB)).max(1) as u32
    }

    /// Input shard of this task. Masters come first, then workers.
    pub fn shard_index(&self) -> u32 {
        match self.role {
            ClusterRole::Worker { is_chief: false } => {
                self.spec.num_tasks(MASTER_JOB) as u32 + self.task_index
            }
            _ => self.task_index,
        }
    }
}

/// Outcome of resolving a cluster description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// No usable topology; run as a single-process chief.
    Local,
    Task(TaskAssignment),
}

impl Placement {
    pub fn role(&self) -> ClusterRole {
        match self {
            Self::Local => ClusterRole::Chief,
            Self::Task(task) => task.role,
        }
    }
}

/// Decides this process's role.
///
/// A missing description, cluster map, task type or task index all mean a
/// local run. Otherwise the task must name a `ps`, `master` or `worker` job
/// listed in the cluster with an in-range index; this is checked before any
/// server is started.
///
/// # Errors
///
/// Returns a configuration error for an unsupported job name, a job missing
/// from the cluster map, or an out-of-range task index.
pub fn resolve(config: Option<&ClusterConfig>) -> Result<Placement> {
    let Some(config) = config else {
        return Ok(Placement::Local);
    };
    let (Some(cluster), Some(task)) = (&config.cluster, &config.task) else {
        return Ok(Placement::Local);
    };
    let (Some(job_name), Some(task_index)) = (&task.kind, task.index) else {
        return Ok(Placement::Local);
    };

    let role = match job_name.as_str() {
        PS_JOB => ClusterRole::ParameterServer,
        MASTER_JOB => ClusterRole::Worker { is_chief: true },
        WORKER_JOB => ClusterRole::Worker { is_chief: false },
        other => {
            return Err(TrainError::config(format!(
                "unsupported task type '{other}', expected one of \"{PS_JOB}\", \"{MASTER_JOB}\", \"{WORKER_JOB}\""
            )))
        }
    };

    let spec = ClusterSpec::new(cluster.clone());
    let num_tasks = spec.num_tasks(job_name);
    if num_tasks == 0 {
        let jobs = spec.jobs().collect::<Vec<_>>().join(", ");
        return Err(TrainError::config(format!(
            "task type '{job_name}' has no entries in the cluster map (jobs: [{jobs}])"
        )));
    }
    if task_index as usize >= num_tasks {
        return Err(TrainError::config(format!(
            "task index {task_index} out of range for job '{job_name}' with {num_tasks} task(s)"
        )));
    }

    Ok(Placement::Task(TaskAssignment {
        spec,
        job_name: job_name.clone(),
        task_index,
        role,
    }))
}
