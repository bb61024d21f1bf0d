//! `exec_command` — run an allowlisted binary directly, never through a
//! shell. Argv is built from a validated, split command string and spawned
//! with `Command::new`, so shell metacharacters in the input can never
//! chain a second command.

use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use chainreview_domain::error::Result;

use crate::sandbox::{build_child_env, validate_exec_command};

const EXEC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit: i32,
}

pub async fn exec_command(repo_root: &std::path::Path, cmd: &str, extra_allowed: &[String]) -> Result<ExecResult> {
    let argv = validate_exec_command(cmd, extra_allowed)?;

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    command.current_dir(repo_root);
    command.kill_on_drop(true);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    command.stdin(std::process::Stdio::null());

    command.env_clear();
    for (k, v) in build_child_env(&[]) {
        command.env(k, v);
    }

    let child = command.spawn().map_err(|e| {
        chainreview_domain::error::Error::ToolFailure(format!("failed to spawn '{}': {e}", argv[0]))
    })?;

    let output = tokio::time::timeout(EXEC_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| chainreview_domain::error::Error::Timeout(format!("exec_command '{cmd}' exceeded {EXEC_TIMEOUT:?}")))?
        .map_err(|e| chainreview_domain::error::Error::ToolFailure(format!("command I/O error: {e}")))?;

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit: output.status.code().unwrap_or(-1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_command_runs_allowlisted_binary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "hello\nworld\n").unwrap();
        let result = exec_command(dir.path(), "wc -l f.txt", &[]).await.unwrap();
        assert_eq!(result.exit, 0);
        assert!(result.stdout.contains('2'));
    }

    #[tokio::test]
    async fn exec_command_rejects_disallowed_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = exec_command(dir.path(), "curl http://example.com", &[]).await.unwrap_err();
        assert!(matches!(err, chainreview_domain::error::Error::AllowlistViolation(_)));
    }

    #[tokio::test]
    async fn exec_command_never_invokes_a_shell() {
        let dir = tempfile::tempdir().unwrap();
        // if this ran through a shell, `;` would separate two commands
        // instead of being rejected as a metacharacter.
        let err = exec_command(dir.path(), "echo hi; echo bye", &[]).await.unwrap_err();
        assert!(matches!(err, chainreview_domain::error::Error::AllowlistViolation(_)));
    }
}
