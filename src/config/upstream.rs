use std::fmt::Debug;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Connection and notification settings of the source store
#[derive(Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty means no `AUTH` on connect
    #[serde(default)]
    pub password: String,

    /// Logical database selected on connect and used in the event channel name
    #[serde(default)]
    pub db: u32,

    /// Value written to `notify-keyspace-events` before subscribing
    #[serde(default = "default_notification_config")]
    pub notification_config: String,

    /// Event name suffix of the keyevent channel, e.g. `hset`
    #[serde(default = "default_event")]
    pub event: String,

    /// Re-apply the record's `expire` field upstream after persisting it
    #[serde(default)]
    pub apply_ttl: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Debug for UpstreamConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("event", &self.event)
            .field("apply_ttl", &self.apply_ttl)
            .finish()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: String::new(),
            db: 0,
            notification_config: default_notification_config(),
            event: default_event(),
            apply_ttl: false,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("upstream.host cannot be empty"));
        }
        if self.port == 0 {
            return Err(invalid("upstream.port must be non-zero"));
        }
        if self.event.trim().is_empty() {
            return Err(invalid("upstream.event cannot be empty"));
        }
        if self.notification_config.trim().is_empty() {
            return Err(invalid("upstream.notification_config cannot be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("upstream.connect_timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    /// `host:port` string used to dial the source store
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keyevent channel carrying the configured event for the configured db
    pub fn event_channel(&self) -> String {
        format!("__keyevent@{}__:{}", self.db, self.event)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
// keyevent notifications for hash commands
fn default_notification_config() -> String {
    "Eh".to_string()
}
fn default_event() -> String {
    "hset".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
