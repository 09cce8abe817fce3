use super::ConversionError;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` to completion, failing on timeout or a non-zero exit.
    ///
    /// The child is killed if the timeout fires or the request future is dropped.
    pub async fn execute<S: AsRef<OsStr> + std::fmt::Debug>(
        &self,
        program: &str,
        args: &[S],
        working_dir: Option<&Path>,
    ) -> Result<Output, ConversionError> {
        let mut cmd = Command::new(program);
        cmd.args(args);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %program,
            args = ?args,
            timeout_secs = %self.timeout.as_secs(),
            "Executing command"
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ConversionError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ConversionError::Unavailable(format!("cannot run '{}': {}", program, e))
                }
                _ => ConversionError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                program = %program,
                args = ?args,
                status = %output.status,
                stderr = %stderr,
                "Command failed"
            );
            return Err(ConversionError::Failed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(
            program = %program,
            output_size = output.stdout.len(),
            "Command succeeded"
        );

        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let executor = CommandExecutor::new(Duration::from_secs(5));
        let output = executor
            .execute("sh", &["-c", "printf hello"], None)
            .await
            .unwrap();

        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let executor = CommandExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute::<&str>("definitely-not-a-real-docling-binary", &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::Unavailable(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let executor = CommandExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute("sh", &["-c", "echo 'bad input' >&2; exit 3"], None)
            .await
            .unwrap_err();

        match err {
            ConversionError::Failed(msg) => assert!(msg.contains("bad input")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let executor = CommandExecutor::new(Duration::from_millis(100));
        let err = executor
            .execute("sleep", &["5"], None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::Timeout(_)));
    }
}
