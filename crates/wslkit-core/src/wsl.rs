//! Typed adapter over the `wsl.exe` command line.
//!
//! | Operation    | Invocation                                              |
//! |--------------|---------------------------------------------------------|
//! | list         | `wsl --list --verbose`                                  |
//! | import       | `wsl --import <name> <dir> <archive> [--version <n>]`   |
//! | export       | `wsl --export <name> <file>`                            |
//! | unregister   | `wsl --unregister <name>`                               |
//! | install      | `wsl --install -d <name> --no-launch`                   |
//! | version      | `wsl --version`                                         |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use wslkit_common::constants::{DEFAULT_IMPORT_TIMEOUT, DEFAULT_TOOL_TIMEOUT, WSL_BINARY};
use wslkit_common::error::{Result, WslkitError};

use crate::exec::{CommandOptions, CommandOutput, CommandRunner};

/// A registered instance as reported by `wsl --list --verbose`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WslDistro {
    /// Registered name.
    pub name: String,
    /// Reported state (`Running`, `Stopped`, `Installing`, ...).
    pub state: String,
    /// WSL version (1 or 2).
    pub version: u8,
    /// Whether this is the default instance.
    pub is_default: bool,
}

/// Handle on the external tool.
#[derive(Clone)]
pub struct WslTool {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    timeout: Duration,
    import_timeout: Duration,
}

impl std::fmt::Debug for WslTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WslTool")
            .field("binary", &self.binary)
            .field("timeout", &self.timeout)
            .field("import_timeout", &self.import_timeout)
            .finish_non_exhaustive()
    }
}

impl WslTool {
    /// Creates an adapter invoking `wsl.exe` through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: WSL_BINARY.to_string(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            import_timeout: DEFAULT_IMPORT_TIMEOUT,
        }
    }

    /// Overrides the executable name or path.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Overrides the short and long (import/export/install) timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeout: Duration, import_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.import_timeout = import_timeout;
        self
    }

    /// Resolves the executable on `PATH`, if present.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.binary).ok()
    }

    async fn invoke(&self, args: Vec<String>, timeout: Duration) -> Result<CommandOutput> {
        tracing::debug!(binary = %self.binary, ?args, "invoking external tool");
        self.runner
            .run(&self.binary, &args, &CommandOptions::with_timeout(timeout))
            .await
    }

    /// Lists registered instances.
    ///
    /// An installation without any instance reports an error on some
    /// versions; that case is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be run.
    pub async fn list(&self) -> Result<Vec<WslDistro>> {
        match self
            .invoke(vec!["--list".into(), "--verbose".into()], self.timeout)
            .await
        {
            Ok(output) => Ok(parse_list_verbose(&output.stdout)),
            Err(WslkitError::ExternalTool { stderr, .. })
                if stderr.to_lowercase().contains("no installed distributions") =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the live instance named `name` (case-insensitive), if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn find(&self, name: &str) -> Result<Option<WslDistro>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name)))
    }

    /// Imports `archive` as a new instance stored under `install_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` when the tool refuses a duplicate name, or an
    /// error if the tool fails or times out.
    pub async fn import(
        &self,
        name: &str,
        install_dir: &Path,
        archive: &Path,
        version: Option<u8>,
    ) -> Result<()> {
        let mut args = vec![
            "--import".to_string(),
            name.to_string(),
            install_dir.to_string_lossy().into_owned(),
            archive.to_string_lossy().into_owned(),
        ];
        if let Some(version) = version {
            args.push("--version".into());
            args.push(version.to_string());
        }
        match self.invoke(args, self.import_timeout).await {
            Ok(_) => {}
            Err(WslkitError::ExternalTool { stderr, .. })
                if stderr.to_lowercase().contains("already exists") =>
            {
                return Err(WslkitError::AlreadyExists {
                    kind: "image",
                    id: name.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
        tracing::info!(name, install_dir = %install_dir.display(), "imported instance");
        Ok(())
    }

    /// Exports instance `name` to the archive `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or times out.
    pub async fn export(&self, name: &str, dest: &Path) -> Result<()> {
        let args = vec![
            "--export".to_string(),
            name.to_string(),
            dest.to_string_lossy().into_owned(),
        ];
        let _ = self.invoke(args, self.import_timeout).await?;
        tracing::info!(name, dest = %dest.display(), "exported instance");
        Ok(())
    }

    /// Unregisters instance `name`, deleting its virtual disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or times out.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let _ = self
            .invoke(vec!["--unregister".into(), name.to_string()], self.timeout)
            .await?;
        tracing::info!(name, "unregistered instance");
        Ok(())
    }

    /// Installs the official distribution `name` without launching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or times out.
    pub async fn install(&self, name: &str) -> Result<()> {
        let args = vec![
            "--install".to_string(),
            "-d".to_string(),
            name.to_string(),
            "--no-launch".to_string(),
        ];
        let _ = self.invoke(args, self.import_timeout).await?;
        tracing::info!(name, "installed distribution natively");
        Ok(())
    }

    /// Returns the first line of `wsl --version`, or `None` when unsupported.
    pub async fn version(&self) -> Option<String> {
        match self.invoke(vec!["--version".into()], self.timeout).await {
            Ok(output) => output
                .stdout
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(ToString::to_string),
            Err(e) => {
                tracing::debug!(error = %e, "tool version unavailable");
                None
            }
        }
    }
}

/// Parses the output of `wsl --list --verbose`.
///
/// The first non-empty line is the (possibly localized) header. Each row is
/// `[*] NAME STATE VERSION`, where `*` marks the default instance.
#[must_use]
pub fn parse_list_verbose(text: &str) -> Vec<WslDistro> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(1)
        .filter_map(parse_row)
        .collect()
}

fn parse_row(line: &str) -> Option<WslDistro> {
    let (is_default, rest) = line
        .strip_prefix('*')
        .map_or((false, line), |r| (true, r.trim_start()));
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let version = tokens[tokens.len() - 1].parse().ok()?;
    Some(WslDistro {
        name: tokens[0].to_string(),
        state: tokens[1..tokens.len() - 1].join(" "),
        version,
        is_default,
    })
}
