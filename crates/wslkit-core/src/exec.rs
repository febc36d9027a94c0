//! Argument-vector command execution.
//!
//! [`CommandRunner`] is the seam between the lifecycle logic and real
//! processes; tests substitute an in-memory implementation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use wslkit_common::constants::DEFAULT_TOOL_TIMEOUT;
use wslkit_common::error::{Result, WslkitError};

/// Maximum captured output per stream (1 MiB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Time budget; the process is killed when it is exceeded.
    pub timeout: Duration,
    /// Working directory, if different from the caller's.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandOptions {
    /// Options with the given timeout and no cwd/env overrides.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            cwd: None,
            env: Vec::new(),
        }
    }
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }
}

/// Output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Decoded standard output.
    pub stdout: String,
    /// Decoded standard error.
    pub stderr: String,
    /// Exit code returned by the command.
    pub exit_code: i32,
}

/// Runs external programs.
///
/// Implementations return `Ok` only for a zero exit status. A non-zero exit
/// is `WslkitError::ExternalTool`; an exceeded budget is
/// `WslkitError::Timeout` after the process has been killed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, exits non-zero, or
    /// exceeds `options.timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<CommandOutput> {
        let rendered = render_command(program, args);
        tracing::debug!(command = %rendered, timeout = ?options.timeout, "spawning command");

        let mut cmd = tokio::process::Command::new(program);
        let _ = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            let _ = cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            let _ = cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| WslkitError::ExternalTool {
            command: rendered.clone(),
            exit_code: None,
            stderr: String::new(),
            source: Some(e),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| WslkitError::ExternalTool {
                command: rendered.clone(),
                exit_code: None,
                stderr: String::new(),
                source: Some(e),
            })?,
            Err(_) => {
                tracing::warn!(command = %rendered, "command timed out, process killed");
                return Err(WslkitError::Timeout {
                    operation: rendered,
                    duration: options.timeout,
                });
            }
        };

        let stdout = decode_console_output(truncate(&output.stdout));
        let stderr = decode_console_output(truncate(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            // wsl.exe reports most errors on stdout.
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(WslkitError::ExternalTool {
                command: rendered,
                exit_code: output.status.code(),
                stderr: detail,
                source: None,
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

fn truncate(bytes: &[u8]) -> &[u8] {
    if bytes.len() > MAX_OUTPUT_SIZE {
        tracing::warn!(len = bytes.len(), "command output truncated to {MAX_OUTPUT_SIZE} bytes");
        &bytes[..MAX_OUTPUT_SIZE]
    } else {
        bytes
    }
}

/// Renders a program and its arguments for log and error messages.
#[must_use]
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes console output that may be UTF-16LE (as `wsl.exe` emits) or UTF-8.
#[must_use]
pub fn decode_console_output(bytes: &[u8]) -> String {
    let text = if looks_like_utf16le(bytes) {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    text.trim_start_matches('\u{feff}').replace('\0', "")
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    if bytes[0] == 0xFF && bytes[1] == 0xFE {
        return true;
    }
    let high_zeros = bytes.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
    high_zeros * 2 > bytes.len() / 2
}
