use async_trait::async_trait;
use std::process::{Command, Output};
use std::time::Duration;
use tokio::time::timeout;

use crate::utils::{AppError, AppResult};

/// Exit status plus stdout and stderr joined, the way the external tools
/// report their diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub combined: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Self {
            success: output.status.success(),
            code: output.status.code(),
            combined,
        }
    }
}

/// Seam for every external process the daemon launches (mount, copy,
/// permission repair, teardown, registry refresh, native updaters).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], timeout_secs: u64) -> AppResult<CommandOutput>;
}

pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], timeout_secs: u64) -> AppResult<CommandOutput> {
        let output = run_command_with_timeout(program, args, timeout_secs).await?;
        Ok(output.into())
    }
}

/// Run a system command asynchronously with a timeout.
///
/// Spawns the command on a blocking thread via `tokio::task::spawn_blocking`
/// and wraps it with a timeout so a hung subprocess (e.g. `hdiutil attach`
/// waiting on a license prompt) can never freeze the dispatcher.
pub async fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    timeout_secs: u64,
) -> AppResult<Output> {
    let program = program.to_string();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();

    let program_for_err = program.clone();
    let result = timeout(
        Duration::from_secs(timeout_secs),
        tokio::task::spawn_blocking(move || {
            Command::new(&program)
                .current_dir("/tmp")
                .args(&args)
                .output()
        }),
    )
    .await;

    match result {
        Ok(Ok(Ok(output))) => Ok(output),
        Ok(Ok(Err(e))) => Err(AppError::CommandFailed(format!("{}: {}", program_for_err, e))),
        Ok(Err(e)) => Err(AppError::CommandFailed(format!("task join: {}", e))),
        Err(_) => Err(AppError::CommandFailed(format!(
            "{} timed out after {}s",
            program_for_err, timeout_secs
        ))),
    }
}
