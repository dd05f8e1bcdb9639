use crate::collectors::error::CollectError;
use crate::collectors::parse::decode_cmd_stdout;
use crate::environment::Environment;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs external tools with a hard deadline.
///
/// One call spawns at most one child process and never retries.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    fn is_available(&self, tool: &str) -> bool;

    async fn run(&self, tool: &str, args: &[&str], timeout: Duration)
        -> Result<String, CollectError>;
}

pub struct ProcessRunner {
    env: Arc<dyn Environment>,
}

impl ProcessRunner {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    fn is_available(&self, tool: &str) -> bool {
        self.env.find_executable(tool).is_some()
    }

    async fn run(
        &self,
        tool: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, CollectError> {
        let Some(program) = self.env.find_executable(tool) else {
            return Err(CollectError::ToolUnavailable {
                tool: tool.to_string(),
            });
        };

        let start = Instant::now();
        let child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CollectError::Spawn {
                tool: tool.to_string(),
                reason: err.to_string(),
            })?;

        // Dropping the pending future drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                debug!(
                    tool,
                    status = ?output.status.code(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool finished"
                );
                Ok(decode_cmd_stdout(&output.stdout))
            }
            Ok(Err(err)) => Err(CollectError::Spawn {
                tool: tool.to_string(),
                reason: err.to_string(),
            }),
            Err(_elapsed) => {
                warn!(tool, timeout_ms = timeout.as_millis() as u64, "tool timed out");
                Err(CollectError::Timeout {
                    tool: tool.to_string(),
                    after: timeout,
                })
            }
        }
    }
}
