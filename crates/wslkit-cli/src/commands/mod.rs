//! CLI command definitions and dispatch.

pub mod context;
pub mod distro;
pub mod image;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use self::context::Context;

/// wslkit — WSL templates and images.
#[derive(Parser, Debug)]
#[command(name = "wslkit", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = "WSLKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage root for the catalog, archives and image metadata.
    #[arg(long, global = true, env = "WSLKIT_HOME")]
    pub data_dir: Option<PathBuf>,

    /// Never contact the registry or download archives.
    #[arg(long, global = true, env = "WSLKIT_OFFLINE")]
    pub offline: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the template catalog.
    #[command(subcommand)]
    Distro(distro::DistroCommand),
    /// Manage images (registered instances).
    #[command(subcommand)]
    Image(image::ImageCommand),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::from_cli(&cli)?;
    match cli.command {
        Command::Distro(cmd) => distro::execute(&ctx, cmd).await,
        Command::Image(cmd) => image::execute(&ctx, cmd).await,
    }
}
