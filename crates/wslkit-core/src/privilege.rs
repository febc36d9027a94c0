//! Detection of an elevated (administrator/root) caller.

use crate::exec::CommandRunner;

/// Returns whether the current process holds elevated privileges.
///
/// On Windows this probes `net session`, which only succeeds for an
/// administrator. On Unix it checks the effective user ID.
#[allow(clippy::unused_async)]
pub async fn is_elevated(runner: &dyn CommandRunner) -> bool {
    #[cfg(windows)]
    {
        use crate::exec::CommandOptions;
        let probe = runner
            .run(
                "net",
                &["session".to_string()],
                &CommandOptions::with_timeout(std::time::Duration::from_secs(10)),
            )
            .await;
        tracing::debug!(elevated = probe.is_ok(), "privilege probe");
        probe.is_ok()
    }
    #[cfg(unix)]
    {
        let _ = runner;
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = runner;
        false
    }
}
