//! Official distribution index lookup.
//!
//! The index is Microsoft's `DistributionInfo.json`. It carries two shapes:
//! legacy `Distributions` entries pointing at store bundles, and
//! `ModernDistributions` grouped by family, pointing at importable rootfs
//! archives with a checksum per architecture.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use wslkit_common::error::Result;
use wslkit_common::types::{Architecture, Sha256Hash};

use crate::http::HttpClient;
use crate::template::{Template, TemplateOrigin};

/// Archive suffixes the external tool can import directly.
const IMPORTABLE_SUFFIXES: &[&str] = &[".tar", ".tar.gz", ".tgz", ".wsl"];

/// One distribution advertised by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Distribution name, used as the template name.
    pub name: String,
    /// Human-readable name.
    pub friendly_name: String,
    /// Store package URL (often a non-importable bundle).
    pub package_url: Option<String>,
    /// Importable rootfs URL.
    pub wsl_url: Option<String>,
    /// Advertised digest of the rootfs.
    pub sha256: Option<Sha256Hash>,
}

impl RegistryEntry {
    /// URL of an archive the external tool can import, if any.
    ///
    /// Prefers the rootfs URL; a package URL only qualifies when it names
    /// a tar archive.
    #[must_use]
    pub fn importable_url(&self) -> Option<&str> {
        self.wsl_url
            .as_deref()
            .or_else(|| self.package_url.as_deref().filter(|u| is_importable(u)))
    }

    /// Converts the entry into a default template tagged `official`.
    #[must_use]
    pub fn to_template(&self) -> Template {
        let mut template = Template::new(&self.name)
            .with_display_name(&self.friendly_name)
            .with_tag("official")
            .with_origin(TemplateOrigin::Default);
        template.source_url = self.importable_url().map(str::to_string);
        template.sha256.clone_from(&self.sha256);
        template
    }
}

fn is_importable(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMPORTABLE_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Source of official distributions.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Lists every advertised distribution.
    async fn list(&self) -> Result<Vec<RegistryEntry>>;

    /// Finds a distribution by name, ignoring ASCII case.
    async fn find(&self, name: &str) -> Result<Option<RegistryEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name)))
    }
}

/// [`RegistryLookup`] reading `DistributionInfo.json` over HTTP.
pub struct DistributionInfoLookup {
    http: Arc<dyn HttpClient>,
    url: String,
    arch: Architecture,
}

impl std::fmt::Debug for DistributionInfoLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionInfoLookup")
            .field("url", &self.url)
            .field("arch", &self.arch)
            .finish_non_exhaustive()
    }
}

impl DistributionInfoLookup {
    /// Creates a lookup for the host architecture.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            arch: Architecture::host(),
        }
    }

    /// Picks URLs for `arch` instead of the host architecture.
    #[must_use]
    pub const fn with_architecture(mut self, arch: Architecture) -> Self {
        self.arch = arch;
        self
    }
}

#[async_trait]
impl RegistryLookup for DistributionInfoLookup {
    async fn list(&self) -> Result<Vec<RegistryEntry>> {
        tracing::debug!(url = %self.url, "fetching distribution index");
        let text = self.http.get_text(&self.url).await?;
        parse_distribution_info(&text, self.arch)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionInfo {
    #[serde(default)]
    distributions: Vec<LegacyDistribution>,
    #[serde(default)]
    modern_distributions: BTreeMap<String, Vec<ModernDistribution>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyDistribution {
    name: String,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    amd64_package_url: Option<String>,
    #[serde(default)]
    arm64_package_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModernDistribution {
    name: String,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    amd64_url: Option<ArchiveRef>,
    #[serde(default)]
    arm64_url: Option<ArchiveRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveRef {
    url: String,
    #[serde(default)]
    sha256: Option<String>,
}

/// Parses the index, picking URLs for `arch`.
///
/// Modern entries replace legacy entries of the same name. A malformed
/// checksum is dropped rather than failing the whole document.
///
/// # Errors
///
/// Returns an error if the document is not valid JSON.
pub fn parse_distribution_info(text: &str, arch: Architecture) -> Result<Vec<RegistryEntry>> {
    let info: DistributionInfo = serde_json::from_str(text)?;
    let arm = arch == Architecture::Arm64;
    let mut entries: Vec<RegistryEntry> = Vec::new();

    for legacy in info.distributions {
        let package_url = if arm {
            legacy.arm64_package_url
        } else {
            legacy.amd64_package_url
        };
        entries.push(RegistryEntry {
            friendly_name: legacy.friendly_name.unwrap_or_else(|| legacy.name.clone()),
            name: legacy.name,
            package_url,
            wsl_url: None,
            sha256: None,
        });
    }

    for modern in info.modern_distributions.into_values().flatten() {
        let archive = if arm { modern.arm64_url } else { modern.amd64_url };
        let Some(archive) = archive else {
            continue;
        };
        let sha256 = archive
            .sha256
            .as_deref()
            .and_then(|s| Sha256Hash::from_hex(s).ok());
        let entry = RegistryEntry {
            friendly_name: modern.friendly_name.unwrap_or_else(|| modern.name.clone()),
            name: modern.name,
            package_url: None,
            wsl_url: Some(archive.url),
            sha256,
        };
        match entries
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(&entry.name))
        {
            Some(existing) => {
                existing.wsl_url = entry.wsl_url;
                existing.sha256 = entry.sha256;
                existing.friendly_name = entry.friendly_name;
            }
            None => entries.push(entry),
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "0xAB12CD34AB12CD34AB12CD34AB12CD34AB12CD34AB12CD34AB12CD34AB12CD34";

    fn sample() -> String {
        format!(
            r#"{{
                "Default": "Ubuntu",
                "Distributions": [
                    {{
                        "Name": "Ubuntu",
                        "FriendlyName": "Ubuntu",
                        "Amd64PackageUrl": "https://example.test/Ubuntu.appxbundle",
                        "Arm64PackageUrl": "https://example.test/Ubuntu-arm.appxbundle"
                    }},
                    {{
                        "Name": "Debian",
                        "FriendlyName": "Debian GNU/Linux",
                        "Amd64PackageUrl": "https://example.test/debian.tar.gz?sig=1"
                    }}
                ],
                "ModernDistributions": {{
                    "Ubuntu": [
                        {{
                            "Name": "Ubuntu-24.04",
                            "FriendlyName": "Ubuntu 24.04 LTS",
                            "Amd64Url": {{ "Url": "https://example.test/noble-amd64.wsl", "Sha256": "{DIGEST}" }},
                            "Arm64Url": {{ "Url": "https://example.test/noble-arm64.wsl", "Sha256": "not-a-digest" }}
                        }}
                    ]
                }}
            }}"#
        )
    }

    #[test]
    fn parses_both_shapes_for_x64() {
        let entries = parse_distribution_info(&sample(), Architecture::X64).expect("parse");
        assert_eq!(entries.len(), 3);

        let ubuntu = entries.iter().find(|e| e.name == "Ubuntu").expect("legacy");
        assert!(ubuntu.importable_url().is_none());

        let debian = entries.iter().find(|e| e.name == "Debian").expect("legacy");
        assert_eq!(
            debian.importable_url(),
            Some("https://example.test/debian.tar.gz?sig=1")
        );

        let noble = entries.iter().find(|e| e.name == "Ubuntu-24.04").expect("modern");
        assert_eq!(noble.importable_url(), Some("https://example.test/noble-amd64.wsl"));
        assert_eq!(
            noble.sha256.as_ref().map(|h| h.as_hex().to_string()),
            Some(DIGEST[2..].to_ascii_lowercase())
        );
    }

    #[test]
    fn arm64_picks_arm_urls_and_drops_bad_digest() {
        let entries = parse_distribution_info(&sample(), Architecture::Arm64).expect("parse");
        let noble = entries.iter().find(|e| e.name == "Ubuntu-24.04").expect("modern");
        assert_eq!(noble.wsl_url.as_deref(), Some("https://example.test/noble-arm64.wsl"));
        assert!(noble.sha256.is_none());
        let debian = entries.iter().find(|e| e.name == "Debian").expect("legacy");
        assert!(debian.package_url.is_none());
    }

    #[test]
    fn to_template_is_default_and_official() {
        let entries = parse_distribution_info(&sample(), Architecture::X64).expect("parse");
        let noble = entries.iter().find(|e| e.name == "Ubuntu-24.04").expect("modern");
        let template = noble.to_template();
        assert!(template.is_default());
        assert!(template.tags.iter().any(|t| t == "official"));
        assert_eq!(template.display_name, "Ubuntu 24.04 LTS");
        assert!(template.sha256.is_some());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_distribution_info("<html>", Architecture::X64).is_err());
    }
}
