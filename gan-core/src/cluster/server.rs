// gan-core/src/cluster/server.rs

//! Cluster membership endpoint.
//!
//! Every distributed task binds the port named for it in the cluster map.
//! Workers keep the endpoint open while they train; parameter servers only
//! ever serve it.

use std::convert::Infallible;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use super::resolver::TaskAssignment;
use crate::error::{Result, TrainError};

/// A started cluster server.
#[async_trait]
pub trait ClusterServer: Send {
    /// Endpoint string training sessions connect through.
    fn target(&self) -> &str;

    /// Serves until a fatal error. Never returns `Ok`.
    async fn join(self: Box<Self>) -> Result<Infallible>;
}

/// Starts the server for a task.
#[async_trait]
pub trait ServerFactory: Send + Sync {
    async fn start(&self, task: &TaskAssignment) -> Result<Box<dyn ClusterServer>>;
}

/// Binds plain TCP listeners on all interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpServerFactory;

#[async_trait]
impl ServerFactory for TcpServerFactory {
    async fn start(&self, task: &TaskAssignment) -> Result<Box<dyn ClusterServer>> {
        let address = task.address();
        let port = parse_port(address)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            TrainError::cluster_with_source(format!("failed to bind {bind_addr}"), e)
        })?;

        tracing::info!(
            job = %task.job_name,
            task = task.task_index,
            %bind_addr,
            "Cluster server started"
        );

        Ok(Box::new(TcpClusterServer {
            listener,
            target: format!("tcp://{address}"),
            job_name: task.job_name.clone(),
            task_index: task.task_index,
        }))
    }
}

pub struct TcpClusterServer {
    listener: TcpListener,
    target: String,
    job_name: String,
    task_index: u32,
}

impl TcpClusterServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TrainError::cluster_with_source("failed to read listener address", e))
    }
}

#[async_trait]
impl ClusterServer for TcpClusterServer {
    fn target(&self) -> &str {
        &self.target
    }

    async fn join(self: Box<Self>) -> Result<Infallible> {
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                TrainError::cluster_with_source(
                    format!("{}/{} failed to accept connection", self.job_name, self.task_index),
                    e,
                )
            })?;

            tracing::debug!(job = %self.job_name, task = self.task_index, %peer, "Peer connected");
            tokio::spawn(drain(stream, peer));
        }
    }
}

async fn drain(mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = [0u8; 4096];
    let mut total = 0usize;
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) => {
                tracing::warn!(%peer, "Peer connection failed: {}", e);
                return;
            }
        }
    }
    tracing::debug!(%peer, bytes = total, "Peer disconnected");
}

fn parse_port(address: &str) -> Result<u16> {
    let port = address
        .rsplit_once(':')
        .map(|(_, port)| port)
        .ok_or_else(|| TrainError::config(format!("cluster address '{address}' has no port")))?;
    port.parse()
        .map_err(|e| TrainError::config_with_source(format!("invalid port in '{address}'"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::resolver::{resolve, Placement};
    use crate::cluster::spec::ClusterConfig;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn ps_task(address: &str) -> TaskAssignment {
        let config = ClusterConfig::new(
            [("ps".to_string(), vec![address.to_string()])],
            "ps",
            0,
        );
        match resolve(Some(&config)).unwrap() {
            Placement::Task(task) => task,
            Placement::Local => panic!("expected a task"),
        }
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("host:2222").unwrap(), 2222);
        assert_eq!(parse_port("[::1]:80").unwrap(), 80);
        assert!(parse_port("host").unwrap_err().is_config());
        assert!(parse_port("host:http").unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_join_serves_until_aborted() {
        let server = TcpServerFactory.start(&ps_task("localhost:0")).await.unwrap();
        assert_eq!(server.target(), "tcp://localhost:0");

        let handle = tokio::spawn(server.join());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_accepts_peers() {
        let server = TcpClusterServer {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            target: "tcp://test".to_string(),
            job_name: "ps".to_string(),
            task_index: 0,
        };
        let addr = server.local_addr().unwrap();

        let handle = tokio::spawn(Box::new(server).join());
        for _ in 0..2 {
            let mut peer = TcpStream::connect(addr).await.unwrap();
            peer.write_all(b"hello").await.unwrap();
            peer.shutdown().await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
