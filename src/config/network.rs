use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Line-protocol administrative command service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_admin_addr")]
    pub listen_address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_admin_addr(),
        }
    }
}

impl AdminConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.listen_address.port() == 0 {
            return Err(invalid("admin.listen_address must specify a non-zero port"));
        }
        Ok(())
    }
}

/// Length-framed read-only query agent
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_agent_addr")]
    pub listen_address: SocketAddr,

    /// Largest accepted request frame body
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Requests of one connection being served concurrently
    #[serde(default = "default_max_inflight_requests")]
    pub max_inflight_requests: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_agent_addr(),
            max_frame_bytes: default_max_frame_bytes(),
            max_inflight_requests: default_max_inflight_requests(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.listen_address.port() == 0 {
            return Err(invalid("agent.listen_address must specify a non-zero port"));
        }
        if self.max_frame_bytes == 0 {
            return Err(invalid("agent.max_frame_bytes must be greater than 0"));
        }
        if self.max_inflight_requests == 0 {
            return Err(invalid("agent.max_inflight_requests must be greater than 0"));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7380))
}
fn default_agent_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7381))
}
fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_max_inflight_requests() -> usize {
    64
}
