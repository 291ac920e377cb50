use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_name: default_file_name(),
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(invalid("log.log_dir cannot be empty"));
        }
        if self.file_name.trim().is_empty() {
            return Err(invalid("log.file_name cannot be empty"));
        }
        Ok(())
    }

    pub fn file_path(&self) -> PathBuf {
        self.log_dir.join(&self.file_name)
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_file_name() -> String {
    "syncer.log".to_string()
}
