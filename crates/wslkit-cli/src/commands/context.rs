//! Builds the managers a command needs from configuration and flags.

use std::sync::Arc;

use anyhow::Context as _;
use wslkit_common::config::WslkitConfig;
use wslkit_common::layout::StorageLayout;
use wslkit_core::exec::{CommandRunner, TokioCommandRunner};
use wslkit_core::privilege;
use wslkit_core::wsl::WslTool;
use wslkit_distro::download::DownloadFallbackChain;
use wslkit_distro::http::{HttpClient, ReqwestHttpClient};
use wslkit_distro::lookup::{DistributionInfoLookup, RegistryLookup};
use wslkit_distro::manager::DistroCatalogManager;
use wslkit_distro::seed::default_templates;
use wslkit_runtime::lifecycle::ImageLifecycleManager;

use super::Cli;

/// Resolved settings shared by every command.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration.
    pub config: WslkitConfig,
    /// Whether to print JSON.
    pub json: bool,
}

impl Context {
    /// Loads the configuration file, then applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => WslkitConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => WslkitConfig::default(),
        };
        if let Some(dir) = &cli.data_dir {
            config.data_dir.clone_from(dir);
        }
        config.offline |= cli.offline;
        tracing::debug!(data_dir = %config.data_dir.display(), offline = config.offline, "configuration resolved");
        Ok(Self {
            config,
            json: cli.json,
        })
    }

    fn layout(&self) -> anyhow::Result<StorageLayout> {
        let layout = self.config.layout();
        layout.ensure_dirs()?;
        Ok(layout)
    }

    fn runner() -> Arc<dyn CommandRunner> {
        Arc::new(TokioCommandRunner)
    }

    fn tool(&self) -> WslTool {
        let tool = WslTool::new(Self::runner())
            .with_binary(self.config.tool_binary.clone())
            .with_timeouts(self.config.tool_timeout(), self.config.import_timeout());
        if tool.locate().is_none() {
            tracing::warn!(binary = %self.config.tool_binary, "external tool not found on PATH");
        }
        tool
    }

    /// Opens the template catalog with registry refresh and downloads wired.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root or HTTP client cannot be set up.
    pub async fn catalog(&self) -> anyhow::Result<DistroCatalogManager> {
        let layout = self.layout()?;
        let manager = DistroCatalogManager::open(layout, default_templates())
            .await
            .with_offline(self.config.offline);
        if self.config.offline {
            return Ok(manager);
        }

        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(&self.config.created_by)?);
        let lookup: Arc<dyn RegistryLookup> = Arc::new(DistributionInfoLookup::new(
            Arc::clone(&http),
            self.config.registry_url.clone(),
        ));
        let runner = Self::runner();
        let elevated = privilege::is_elevated(runner.as_ref()).await;

        let mut chain = DownloadFallbackChain::new(http)
            .with_lookup(Arc::clone(&lookup))
            .with_native_install(self.tool(), elevated)
            .with_retries(self.config.download_retries)
            .with_probe_timeout(self.config.size_probe_timeout());
        if let Some(base) = &self.config.mirror_base_url {
            chain = chain.with_mirror_base(base.clone());
        }
        Ok(manager.with_registry(lookup).with_downloader(chain))
    }

    /// Opens the image lifecycle manager on top of the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be opened.
    pub async fn images(&self) -> anyhow::Result<ImageLifecycleManager> {
        let catalog = Arc::new(self.catalog().await?);
        let layout = self.layout()?;
        Ok(ImageLifecycleManager::open(layout, self.tool(), catalog)
            .await
            .with_created_by(self.config.created_by.clone()))
    }
}
