//! `wslkit image` — Manage images.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use wslkit_common::error::WslkitError;
use wslkit_runtime::lifecycle::{ImageInfo, ImageOptions, ImagePatch};
use wslkit_runtime::registry::SourceType;

use super::context::Context;
use crate::output;

/// Image subcommands.
#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// List live images with their recorded metadata.
    List,
    /// Create an image from a downloaded template.
    Create {
        /// Template to import.
        template: String,
        /// Name of the new image.
        name: String,
        /// Settings for the new image.
        #[command(flatten)]
        opts: CreateArgs,
    },
    /// Copy an existing image into a new one.
    Clone {
        /// Image to copy.
        source: String,
        /// Name of the new image.
        name: String,
        /// Settings for the new image.
        #[command(flatten)]
        opts: CreateArgs,
    },
    /// Unregister an image and delete its metadata.
    Delete {
        /// Image name.
        name: String,
    },
    /// Show an image's metadata and provenance.
    Info {
        /// Image name.
        name: String,
    },
    /// Change an image's display name, description or enabled flag.
    Set {
        /// Image name.
        name: String,
        /// New display name.
        #[arg(long)]
        display_name: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// Enable or disable the image.
        #[arg(long)]
        enabled: Option<bool>,
        /// JSON patch; explicit flags take precedence.
        #[arg(long)]
        patch: Option<String>,
    },
}

/// Options shared by `create` and `clone`.
#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Install directory (default: `<data-dir>/images/instances/<name>`).
    #[arg(long)]
    pub install_path: Option<PathBuf>,
    /// Human-readable name.
    #[arg(long)]
    pub display_name: Option<String>,
    /// Free-form description.
    #[arg(long)]
    pub description: Option<String>,
    /// WSL version for the import (1 or 2).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub wsl_version: Option<u8>,
}

impl From<CreateArgs> for ImageOptions {
    fn from(args: CreateArgs) -> Self {
        Self {
            install_path: args.install_path,
            display_name: args.display_name,
            description: args.description,
            version: args.wsl_version,
        }
    }
}

/// Executes an `image` subcommand.
///
/// # Errors
///
/// Returns an error if the lifecycle operation fails.
pub async fn execute(ctx: &Context, cmd: ImageCommand) -> anyhow::Result<()> {
    let images = ctx.images().await?;
    match cmd {
        ImageCommand::List => {
            let views = images.list_images().await?;
            if ctx.json {
                return output::print_json(&views);
            }
            let rows: Vec<Vec<String>> = views
                .iter()
                .map(|v| {
                    vec![
                        format!("{}{}", if v.is_default { "*" } else { "" }, v.record.name),
                        v.state.clone(),
                        v.wsl_version.to_string(),
                        source_label(v.record.source.as_deref(), v.record.source_type),
                        if v.record.has_manifest { "yes" } else { "no" }.to_string(),
                        if v.record.enabled { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            output::print_table(
                &["NAME", "STATE", "WSL", "SOURCE", "MANIFEST", "ENABLED"],
                &rows,
                "No images found.",
            );
        }
        ImageCommand::Create {
            template,
            name,
            opts,
        } => {
            let record = images
                .create_from_template(&template, &name, opts.into())
                .await?;
            println!("Created {} from template {template} ({})", record.name, record.id);
        }
        ImageCommand::Clone { source, name, opts } => {
            let record = images.clone_image(&source, &name, opts.into()).await?;
            println!("Cloned {source} into {} ({})", record.name, record.id);
        }
        ImageCommand::Delete { name } => {
            images.delete_image(&name).await?;
            println!("Deleted {name}");
        }
        ImageCommand::Info { name } => {
            let info = images.get_image_info(&name).await.ok_or(WslkitError::NotFound {
                kind: "image",
                id: name,
            })?;
            if ctx.json {
                return output::print_json(&info);
            }
            print_info(&info);
        }
        ImageCommand::Set {
            name,
            display_name,
            description,
            enabled,
            patch,
        } => {
            let mut merged: ImagePatch = match patch {
                Some(json) => serde_json::from_str(&json)?,
                None => ImagePatch::default(),
            };
            merged.display_name = display_name.or(merged.display_name);
            merged.description = description.or(merged.description);
            merged.enabled = enabled.or(merged.enabled);
            let record = images.update_image_properties(&name, merged).await?;
            if ctx.json {
                return output::print_json(&record);
            }
            println!("Updated {}", record.name);
        }
    }
    Ok(())
}

fn source_label(source: Option<&str>, source_type: Option<SourceType>) -> String {
    match (source, source_type) {
        (Some(s), Some(SourceType::Template)) => format!("template:{s}"),
        (Some(s), Some(SourceType::Image)) => format!("image:{s}"),
        (Some(s), None) => s.to_string(),
        (None, _) => "-".to_string(),
    }
}

fn print_info(info: &ImageInfo) {
    let r = &info.record;
    println!("Name:         {}", r.name);
    println!("ID:           {}", r.id);
    println!("Display name: {}", r.display_name);
    if !r.description.is_empty() {
        println!("Description:  {}", r.description);
    }
    println!("Source:       {}", source_label(r.source.as_deref(), r.source_type));
    println!("Created:      {} by {}", r.created.to_rfc3339(), r.created_by);
    println!("Enabled:      {}", r.enabled);
    if let Some(path) = &r.install_path {
        println!("Install path: {}", path.display());
    }
    if let Some(version) = &r.tool_version {
        println!("WSL:          {version}");
    }
    match &info.manifest {
        Some(manifest) => {
            if let Some(root) = manifest.root() {
                println!("Root:         {root}");
            }
            println!("Lineage:      {}", manifest.metadata.lineage.join(" -> "));
            for layer in &manifest.layers {
                let at = layer.at.map_or_else(String::new, |t| format!(" at {}", t.to_rfc3339()));
                println!("  {:?} from {}{at}", layer.op, layer.from);
            }
        }
        None => println!("Manifest:     none (legacy image)"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    #[test]
    fn source_labels() {
        assert_eq!(source_label(Some("ubuntu"), Some(SourceType::Template)), "template:ubuntu");
        assert_eq!(source_label(Some("dev1"), Some(SourceType::Image)), "image:dev1");
        assert_eq!(source_label(None, None), "-");
    }

    #[test]
    fn create_flags_map_to_options() {
        let cli = Cli::try_parse_from([
            "wslkit",
            "image",
            "create",
            "ubuntu-22.04",
            "dev1",
            "--install-path",
            "D:/wsl/dev1",
            "--wsl-version",
            "2",
        ])
        .expect("parse");
        let Command::Image(ImageCommand::Create { opts, .. }) = cli.command else {
            panic!("expected image create");
        };
        let opts = ImageOptions::from(opts);
        assert_eq!(opts.version, Some(2));
        assert_eq!(opts.install_path, Some(PathBuf::from("D:/wsl/dev1")));
    }

    #[test]
    fn wsl_version_is_range_checked() {
        assert!(
            Cli::try_parse_from(["wslkit", "image", "create", "t", "n", "--wsl-version", "3"])
                .is_err()
        );
    }
}
