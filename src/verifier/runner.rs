//! Sandboxed execution runner.
//!
//! Author and user supplied code runs in a separate OS process with a hard
//! timeout. The isolation boundary is deliberate: untrusted code must never
//! hang a worker or crash this process. Every failure mode is converted into
//! a typed `VerifyError`:
//!   - killed for exceeding the budget  -> Timeout
//!   - non-zero exit with stderr        -> User (stderr becomes the detail)
//!   - non-zero exit without stderr     -> Internal
//!   - spawn failure                    -> Internal
//! Stdout is split into non-empty lines on every path so partial progress is
//! visible even when the run fails.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::VerifyError;
use crate::util::split_output_lines;

/// One request to the runner. `command` is interpreted by `sh -c`, matching
/// what workshop authors write in their book config.
pub struct ExecSpec {
    pub command: String,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
    /// Start from an empty environment (plus PATH) instead of inheriting.
    /// Script targets use this so only sanitized inputs reach the child.
    pub clear_env: bool,
    pub timeout_ms: u64,
    pub debug_output: bool,
}

/// Run the command to completion or kill it at the deadline.
/// Returns the non-empty stdout lines on success.
pub async fn run_sandboxed(spec: &ExecSpec) -> Result<Vec<String>, VerifyError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&spec.command)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if spec.clear_env {
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
    }
    for (name, value) in &spec.envs {
        cmd.env(name, value);
    }

    debug!(target: "verify", command = %spec.command, cwd = %spec.cwd.display(), timeout_ms = spec.timeout_ms, "Spawning verifier process");
    let mut child = cmd
        .spawn()
        .map_err(|e| VerifyError::internal(format!("failed to spawn verifier process: {e}")))?;

    // Drain both pipes concurrently so a chatty child cannot deadlock on a
    // full pipe buffer, and so partial output survives a timeout kill.
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| VerifyError::internal("verifier process has no stdout pipe"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| VerifyError::internal("verifier process has no stderr pipe"))?;
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let mut timed_out = false;
    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|e| VerifyError::internal(format!("failed to await verifier process: {e}")))?
        }
        _ = tokio::time::sleep(Duration::from_millis(spec.timeout_ms)) => {
            timed_out = true;
            let _ = child.start_kill();
            child
                .wait()
                .await
                .map_err(|e| VerifyError::internal(format!("failed to reap verifier process: {e}")))?
        }
    };

    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

    if spec.debug_output {
        debug!(target: "verify", %stdout, %stderr, "Dumping stdout and stderr from verifier process");
    }

    let passed = split_output_lines(&stdout);

    if timed_out {
        let message = format!("Timeout Error: command exceeded {} ms", spec.timeout_ms);
        return Err(VerifyError::timeout(message).with_passed(passed));
    }
    if status.success() {
        return Ok(passed);
    }
    let stderr_trimmed = stderr.trim();
    if stderr_trimmed.is_empty() {
        let message = format!("Unexpected Error: verifier process exited with {status}");
        return Err(VerifyError::internal(message).with_passed(passed));
    }
    Err(VerifyError::user(stderr_trimmed.to_string()).with_passed(passed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VerifyErrorKind;

    fn spec(command: &str, timeout_ms: u64) -> ExecSpec {
        ExecSpec {
            command: command.into(),
            cwd: std::env::temp_dir(),
            envs: vec![],
            clear_env: false,
            timeout_ms,
            debug_output: false,
        }
    }

    #[tokio::test]
    async fn success_returns_non_empty_stdout_lines() {
        let passed = run_sandboxed(&spec("echo one; echo; echo two", 5_000)).await.unwrap();
        assert_eq!(passed, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn env_variables_reach_the_child() {
        let mut s = spec("echo \"$GREETING\"", 5_000);
        s.envs.push(("GREETING".into(), "hello".into()));
        let passed = run_sandboxed(&s).await.unwrap();
        assert_eq!(passed, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn nonzero_exit_with_stderr_is_a_user_error() {
        let err = run_sandboxed(&spec("echo partial; echo broken >&2; exit 1", 5_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::User);
        assert_eq!(err.message, "broken");
        assert_eq!(err.passed, vec!["partial".to_string()]);
    }

    #[tokio::test]
    async fn nonzero_exit_without_stderr_is_internal() {
        let err = run_sandboxed(&spec("exit 3", 5_000)).await.unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::Internal);
    }

    #[tokio::test]
    async fn overrunning_process_is_killed_and_classified_timeout() {
        let err = run_sandboxed(&spec("echo before; sleep 5", 200)).await.unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::Timeout);
        // Partial stdout survives the kill.
        assert_eq!(err.passed, vec!["before".to_string()]);
    }
}
