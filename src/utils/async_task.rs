use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::Result;

/// Spawns a long-lived component task and tracks its JoinHandle.
///
/// The task's error, if any, is logged under `name`; it never propagates to
/// sibling tasks.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<(String, JoinHandle<()>)>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let task_name = name.clone();
    let handle = tokio::spawn(async move {
        match task_fn().await {
            Ok(()) => info!("task {task_name} exited"),
            Err(e) => error!("task {task_name} stopped with error: {:?}", e),
        }
    });

    if let Some(h) = handles {
        h.push((name, handle));
    }
}
