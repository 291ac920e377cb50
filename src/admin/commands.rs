use std::sync::Arc;

use super::CommandRegistry;
use super::CommandResult;
use crate::pipeline::PipelineStats;
use crate::record::index_key;
use crate::storage::LocalStore;

/// Installs `ping`, `status`, `get` and `version`
pub fn register_builtin_commands<S: LocalStore>(
    registry: &CommandRegistry,
    stats: Arc<PipelineStats>,
    store: Arc<S>,
) {
    registry.register("ping", |_: &[&str]| -> CommandResult { Ok("pong".to_string()) });

    registry.register("status", move |_: &[&str]| -> CommandResult { Ok(stats.snapshot().to_string()) });

    let record_store = store.clone();
    registry.register("get", move |args: &[&str]| -> CommandResult {
        let [key] = args else {
            return Err("usage: get <key>".to_string());
        };
        lookup(record_store.as_ref(), key.as_bytes(), key)
    });

    registry.register("version", move |args: &[&str]| -> CommandResult {
        let [key] = args else {
            return Err("usage: version <key>".to_string());
        };
        lookup(store.as_ref(), index_key(key).as_bytes(), key)
    });
}

fn lookup<S: LocalStore>(
    store: &S,
    raw_key: &[u8],
    key: &str,
) -> CommandResult {
    match store.get(raw_key) {
        Ok(Some(value)) => Ok(String::from_utf8_lossy(&value).into_owned()),
        Ok(None) => Err(format!("not found: {key}")),
        Err(e) => Err(e.to_string()),
    }
}
