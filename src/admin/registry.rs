use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::info;

/// `Ok` is rendered as `+ <text>`, `Err` as `- <text>`
pub type CommandResult = std::result::Result<String, String>;

/// Operational command callable over the admin line protocol
///
/// Handlers own whatever typed state they need; arguments are the
/// whitespace-separated words after the command name.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(
        &self,
        args: &[&str],
    ) -> CommandResult;
}

impl<F> CommandHandler for F
where
    F: Fn(&[&str]) -> CommandResult + Send + Sync + 'static,
{
    fn call(
        &self,
        args: &[&str],
    ) -> CommandResult {
        self(args)
    }
}

/// Command name to handler table shared by every admin connection
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("CommandRegistry").field("commands", &names).finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous one
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl CommandHandler,
    ) {
        let name = name.into();
        info!("register cmd: {}", name);
        self.handlers.write().insert(name, Arc::new(handler));
    }

    pub fn unregister(
        &self,
        name: &str,
    ) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Runs one request line and renders the response with its elapsed-time line.
    ///
    /// Returns `None` for a blank line.
    pub fn execute(
        &self,
        line: &str,
    ) -> Option<String> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        let args: Vec<&str> = words.collect();

        let started = Instant::now();
        let handler = self.handlers.read().get(name).cloned();
        let response = match handler {
            Some(handler) => {
                info!("recv command: {}", name);
                match handler.call(&args) {
                    Ok(result) => format!("+ {result}"),
                    Err(e) => format!("- {e}"),
                }
            }
            None => format!("- unknown command: {name}"),
        };

        Some(format!(
            "{response}\nelapsed {:.6} sec",
            started.elapsed().as_secs_f64()
        ))
    }
}
