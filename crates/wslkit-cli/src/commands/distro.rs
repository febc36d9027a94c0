//! `wslkit distro` — Manage the template catalog.

use std::io::Write as _;
use std::path::PathBuf;

use clap::Subcommand;
use wslkit_common::error::WslkitError;
use wslkit_distro::http::DownloadProgress;
use wslkit_distro::template::{Template, TemplateOrigin};

use super::context::Context;
use crate::output::{self, format_bytes, format_size};

/// Template catalog subcommands.
#[derive(Subcommand, Debug)]
pub enum DistroCommand {
    /// List templates, refreshing from the official registry.
    List,
    /// Show one template.
    Info {
        /// Template name.
        name: String,
    },
    /// Import a local rootfs archive as a custom template.
    Add {
        /// Template name.
        name: String,
        /// Archive to import (tar or tar.gz).
        file: PathBuf,
        /// Human-readable name.
        #[arg(long)]
        display_name: Option<String>,
        /// Free-form description.
        #[arg(long)]
        description: Option<String>,
        /// Distribution version string.
        #[arg(long)]
        distro_version: Option<String>,
    },
    /// Delete a template's local archive (and custom entries entirely).
    Remove {
        /// Template name.
        name: String,
    },
    /// Re-hash a template's archive against its recorded checksum.
    Verify {
        /// Template name.
        name: String,
    },
    /// Download a template's archive if it is not available yet.
    Pull {
        /// Template name.
        name: String,
    },
    /// Show catalog disk usage.
    Stats,
}

/// Executes a `distro` subcommand.
///
/// # Errors
///
/// Returns an error if the catalog operation fails.
pub async fn execute(ctx: &Context, cmd: DistroCommand) -> anyhow::Result<()> {
    let catalog = ctx.catalog().await?;
    match cmd {
        DistroCommand::List => {
            let templates = catalog.list().await;
            if ctx.json {
                return output::print_json(&templates);
            }
            let rows: Vec<Vec<String>> = templates.iter().map(template_row).collect();
            output::print_table(
                &["NAME", "VERSION", "ARCH", "SIZE", "AVAILABLE", "ORIGIN"],
                &rows,
                "No templates found.",
            );
        }
        DistroCommand::Info { name } => {
            let template = catalog.get(&name).await.ok_or(WslkitError::NotFound {
                kind: "template",
                id: name,
            })?;
            if ctx.json {
                return output::print_json(&template);
            }
            print_template(&template);
        }
        DistroCommand::Add {
            name,
            file,
            display_name,
            description,
            distro_version,
        } => {
            let mut template = Template::new(name);
            if let Some(display_name) = display_name {
                template = template.with_display_name(display_name);
            }
            if let Some(description) = description {
                template = template.with_description(description);
            }
            if let Some(version) = distro_version {
                template = template.with_version(version);
            }
            let added = catalog.add(template, &file).await?;
            println!(
                "Added {} ({}, {})",
                added.name,
                format_size(added.size_bytes),
                added.sha256.as_ref().map_or_else(String::new, ToString::to_string)
            );
        }
        DistroCommand::Remove { name } => {
            if catalog.remove(&name).await? {
                println!("Removed {name}");
            } else {
                println!("Template {name} not found");
            }
        }
        DistroCommand::Verify { name } => {
            if catalog.verify(&name).await? {
                println!("{name}: OK");
            } else {
                anyhow::bail!("{name}: checksum mismatch or unreadable archive");
            }
        }
        DistroCommand::Pull { name } => {
            let label = name.clone();
            let progress = move |p: DownloadProgress| {
                eprint!("\r{}", output::progress_line(&label, p));
                let _ = std::io::stderr().flush();
            };
            let template = catalog.ensure_available(&name, &progress).await;
            eprintln!();
            let template = template?;
            println!(
                "{} is available at {}",
                template.name,
                template
                    .local_file_path
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string())
            );
        }
        DistroCommand::Stats => {
            let stats = catalog.storage_stats().await;
            if ctx.json {
                return output::print_json(&stats);
            }
            println!(
                "Templates:  {} ({} downloaded)",
                stats.total_templates, stats.downloaded_templates
            );
            println!("Data dir:   {}", catalog.layout().root().display());
            println!("Declared:   {}", format_bytes(stats.declared_bytes));
            println!("On disk:    {}", format_bytes(stats.downloaded_bytes));
        }
    }
    Ok(())
}

fn template_row(t: &Template) -> Vec<String> {
    vec![
        t.name.clone(),
        if t.version.is_empty() { "-".to_string() } else { t.version.clone() },
        t.architecture.to_string(),
        format_size(t.size_bytes),
        if t.available { "yes" } else { "no" }.to_string(),
        origin_label(t.origin).to_string(),
    ]
}

const fn origin_label(origin: TemplateOrigin) -> &'static str {
    match origin {
        TemplateOrigin::Default => "default",
        TemplateOrigin::Custom => "custom",
    }
}

fn print_template(t: &Template) {
    println!("Name:         {}", t.name);
    println!("Display name: {}", t.display_name);
    if !t.description.is_empty() {
        println!("Description:  {}", t.description);
    }
    println!("Architecture: {}", t.architecture);
    println!("Origin:       {}", origin_label(t.origin));
    println!("Available:    {}", t.available);
    println!("Size:         {}", format_size(t.size_bytes));
    if let Some(sha) = &t.sha256 {
        println!("SHA-256:      {}", sha.as_hex());
    }
    if let Some(url) = &t.source_url {
        println!("Source:       {url}");
    }
    if let Some(path) = &t.local_file_path {
        println!("Local file:   {}", path.display());
    }
    if !t.tags.is_empty() {
        println!("Tags:         {}", t.tags.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_marks_missing_values() {
        let row = template_row(&Template::new("alpine"));
        assert_eq!(row, vec!["alpine", "-", "x64", "-", "no", "custom"]);
    }
}
