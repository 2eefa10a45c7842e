// gan-core/src/cluster/mod.rs

//! Cluster topology, role resolution and the membership server.

pub mod resolver;
pub mod server;
pub mod spec;

pub use resolver::{resolve, ClusterRole, Placement, TaskAssignment, MASTER_JOB, PS_JOB, WORKER_JOB};
pub use server::{ClusterServer, ServerFactory, TcpClusterServer, TcpServerFactory};
pub use spec::{ClusterConfig, ClusterSpec, TaskConfig};
