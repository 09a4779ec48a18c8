use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// Everything captured from a finished (or abandoned) child process.
///
/// Callers inspect the content to decide success; a non-zero exit or a
/// timeout is a state of the output, never an `Err`. This keeps every
/// external tool invocation on the fail-soft path the API contract needs.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Result text for display: stdout on success, otherwise whatever the
    /// tool said on stderr (falling back to stdout, then a timeout note).
    pub fn text(&self) -> String {
        if self.success() {
            return self.stdout.trim().to_string();
        }
        if self.timed_out {
            return "command timed out".to_string();
        }
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }

    fn spawn_failure(err: &std::io::Error) -> Self {
        Self {
            stderr: format!("failed to spawn: {}", err),
            exit_code: Some(-1),
            ..Self::default()
        }
    }
}

/// Runs external CLI tools with an explicit timeout and captured output.
///
/// Arguments are always passed as a discrete argv vector; operator text is
/// never interpolated into a shell line, so quoting cannot break out of the
/// intended command. `HOME` and the working directory are pinned so tools
/// that resolve paths relative to the agent home behave the same no matter
/// where the service itself was started.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    home: PathBuf,
}

impl CommandRunner {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// Run `program` with `args`, waiting up to `timeout`.
    ///
    /// On timeout the child is killed (`kill_on_drop`) and the result is
    /// marked `timed_out`; partial pipe contents are not recoverable in
    /// that path, so the captures come back empty.
    pub async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CapturedOutput {
        debug!("exec [{} {}] (budget {:?})", program, args.join(" "), timeout);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("HOME", &self.home)
            .current_dir(&self.home)
            .kill_on_drop(true);

        match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_elapsed) => {
                warn!("exec [{}] exceeded {:?}, killed", program, timeout);
                CapturedOutput {
                    timed_out: true,
                    ..CapturedOutput::default()
                }
            }
            Ok(Err(e)) => {
                warn!("exec [{}] failed to spawn: {}", program, e);
                CapturedOutput::spawn_failure(&e)
            }
            Ok(Ok(output)) => CapturedOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
                timed_out: false,
            },
        }
    }

    /// Fire-and-forget variant: the command runs on the runtime and the
    /// completion continuation receives the captured output. There is no
    /// cancellation path back from the caller; once dispatched the child
    /// runs to completion or timeout.
    pub fn run_background<F>(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
        on_done: F,
    ) where
        F: FnOnce(CapturedOutput) + Send + 'static,
    {
        let runner = self.clone();
        let program = program.to_string();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        tokio::spawn(async move {
            let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
            let output = runner.run(&program, &arg_refs, timeout).await;
            on_done(output);
        });
    }
}
