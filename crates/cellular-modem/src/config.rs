//! Modem stack configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path
    pub path: String,
    pub baud_rate: u32,
    /// Budget for one AT transaction in milliseconds
    pub at_timeout_ms: u64,
    /// Read slice of the steady-state loop in milliseconds
    pub poll_interval_ms: u64,
}

impl SerialConfig {
    pub fn at_timeout(&self) -> Duration {
        Duration::from_millis(self.at_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyS0".to_string(),
            baud_rate: 115_200,
            at_timeout_ms: 2000,
            poll_interval_ms: 200,
        }
    }
}

/// Named-pipe relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Directory holding both FIFOs
    pub dir: PathBuf,
}

impl PipeConfig {
    /// Pipe written by the service, read by the client
    pub fn service_to_client(&self) -> PathBuf {
        self.dir.join("command_pipe_s2c")
    }

    /// Pipe written by the client, read by the service
    pub fn client_to_service(&self) -> PathBuf {
        self.dir.join("command_pipe_c2s")
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp"),
        }
    }
}
