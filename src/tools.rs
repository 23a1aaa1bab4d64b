//! External process invocation.

use crate::error::{AppError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run `program` with `args`, drain its output and wait for it to exit.
///
/// Returns standard output. Spawn failures and non-zero exits become
/// [`AppError::Tool`] with the captured stderr in the message.
pub fn run<I, S>(program: &Path, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::Tool {
            tool: tool.clone(),
            message: format!("failed to spawn: {}", e),
        })?;

    // Reads stdout and stderr to EOF concurrently, then reaps the child.
    let output = child.wait_with_output().map_err(|e| AppError::Tool {
        tool: tool.clone(),
        message: format!("failed to read output: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(tool = %tool, status = %output.status, stderr = %stderr.trim(), "Tool failed");
        return Err(AppError::Tool {
            tool,
            message: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_tool_error() {
        let err = run(Path::new("/nonexistent/folio-tool"), ["x"]).unwrap_err();
        assert!(matches!(err, AppError::Tool { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_tool_error() {
        let err = run(Path::new("sh"), ["-c", "echo oops >&2; exit 3"]).unwrap_err();
        match err {
            AppError::Tool { message, .. } => assert!(message.contains("oops")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_fully_drained() {
        let out = run(Path::new("sh"), ["-c", "head -c 200000 /dev/zero"]).unwrap();
        assert_eq!(out.len(), 200_000);
    }
}
