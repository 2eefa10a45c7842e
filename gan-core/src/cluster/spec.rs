// gan-core/src/cluster/spec.rs

//! Cluster topology as carried by the `CLUSTER_CONFIG` environment variable.
//!
//! ```json
//! {
//!   "cluster": {
//!     "master": ["10.0.0.2:2222"],
//!     "ps": ["10.0.0.3:2222"],
//!     "worker": ["10.0.0.4:2222", "10.0.0.5:2222"]
//!   },
//!   "task": {"type": "worker", "index": 1}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TrainError};

/// Raw cluster description. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub cluster: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub task: Option<TaskConfig>,
}

/// This process's place in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
}

impl ClusterConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TrainError::config_with_source("failed to parse cluster config", e))
    }

    /// Parses the value of the cluster environment variable. Unset or blank
    /// means no cluster.
    pub fn from_env_value(value: Option<&str>) -> Result<Option<Self>> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(json) => Self::from_json(json).map(Some),
        }
    }

    /// Convenience for building a config in code.
    pub fn new(
        cluster: impl IntoIterator<Item = (String, Vec<String>)>,
        kind: impl Into<String>,
        index: u32,
    ) -> Self {
        Self {
            cluster: Some(cluster.into_iter().collect()),
            task: Some(TaskConfig {
                kind: Some(kind.into()),
                index: Some(index),
            }),
        }
    }
}

/// Validated membership: job name to task addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSpec {
    jobs: BTreeMap<String, Vec<String>>,
}

impl ClusterSpec {
    pub fn new(jobs: BTreeMap<String, Vec<String>>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    /// Number of tasks in `job`; zero for an unknown job.
    pub fn num_tasks(&self, job: &str) -> usize {
        self.jobs.get(job).map_or(0, Vec::len)
    }

    pub fn task_address(&self, job: &str, index: u32) -> Option<&str> {
        self.jobs
            .get(job)
            .and_then(|tasks| tasks.get(index as usize))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ClusterConfig::from_json(
            r#"{"cluster": {"ps": ["h0:1"], "worker": ["h1:1", "h2:1"]},
                "task": {"type": "worker", "index": 1},
                "environment": "cloud"}"#,
        )
        .unwrap();

        let task = config.task.unwrap();
        assert_eq!(task.kind.as_deref(), Some("worker"));
        assert_eq!(task.index, Some(1));
        assert_eq!(config.cluster.unwrap()["worker"].len(), 2);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = ClusterConfig::from_json(r#"{"task": {"type": "master"}}"#).unwrap();
        assert!(config.cluster.is_none());
        assert_eq!(config.task.unwrap().index, None);
    }

    #[test]
    fn test_env_value() {
        assert_eq!(ClusterConfig::from_env_value(None).unwrap(), None);
        assert_eq!(ClusterConfig::from_env_value(Some("  ")).unwrap(), None);
        assert!(ClusterConfig::from_env_value(Some("{}")).unwrap().is_some());

        let err = ClusterConfig::from_env_value(Some("{not json")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_cluster_spec_lookup() {
        let spec = ClusterSpec::new(
            [("worker".to_string(), vec!["a:1".to_string(), "b:1".to_string()])]
                .into_iter()
                .collect(),
        );

        assert_eq!(spec.num_tasks("worker"), 2);
        assert_eq!(spec.num_tasks("ps"), 0);
        assert_eq!(spec.task_address("worker", 1), Some("b:1"));
        assert_eq!(spec.task_address("worker", 2), None);
        assert_eq!(spec.jobs().collect::<Vec<_>>(), vec!["worker"]);
    }
}
