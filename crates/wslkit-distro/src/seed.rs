//! Built-in templates written to a fresh catalog.

use wslkit_common::types::Architecture;

use crate::template::{Template, TemplateOrigin};

/// Returns the built-in templates for the running host.
///
/// Entries carry no local archive; they become available once downloaded.
#[must_use]
pub fn default_templates() -> Vec<Template> {
    templates_for(Architecture::host())
}

/// Returns the built-in templates with download URLs for `arch`.
#[must_use]
pub fn templates_for(arch: Architecture) -> Vec<Template> {
    let (ubuntu_arch, alpine_arch) = match arch {
        Architecture::Arm64 => ("arm64", "aarch64"),
        Architecture::X64 | Architecture::Both => ("amd64", "x86_64"),
    };
    let arch = if arch == Architecture::Both { Architecture::X64 } else { arch };
    vec![
        Template::new("ubuntu-24.04")
            .with_display_name("Ubuntu 24.04 LTS")
            .with_description("Ubuntu Noble Numbat root filesystem")
            .with_version("24.04")
            .with_architecture(arch)
            .with_source_url(format!(
                "https://cloud-images.ubuntu.com/wsl/releases/24.04/current/ubuntu-noble-wsl-{ubuntu_arch}-wsl.rootfs.tar.gz"
            ))
            .with_tag("official")
            .with_tag("lts")
            .with_origin(TemplateOrigin::Default),
        Template::new("ubuntu-22.04")
            .with_display_name("Ubuntu 22.04 LTS")
            .with_description("Ubuntu Jammy Jellyfish root filesystem")
            .with_version("22.04")
            .with_architecture(arch)
            .with_source_url(format!(
                "https://cloud-images.ubuntu.com/wsl/jammy/current/ubuntu-jammy-wsl-{ubuntu_arch}-wsl.rootfs.tar.gz"
            ))
            .with_tag("official")
            .with_tag("lts")
            .with_origin(TemplateOrigin::Default),
        Template::new("debian-12")
            .with_display_name("Debian 12")
            .with_description("Debian Bookworm root filesystem")
            .with_version("12")
            .with_tag("official")
            .with_origin(TemplateOrigin::Default),
        Template::new("alpine-3.19")
            .with_display_name("Alpine Linux 3.19")
            .with_description("Alpine minimal root filesystem")
            .with_version("3.19")
            .with_architecture(arch)
            .with_source_url(format!(
                "https://dl-cdn.alpinelinux.org/alpine/v3.19/releases/{alpine_arch}/alpine-minirootfs-3.19.1-{alpine_arch}.tar.gz"
            ))
            .with_tag("minimal")
            .with_origin(TemplateOrigin::Default),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_entries_are_default_and_unavailable() {
        let seed = default_templates();
        assert!(!seed.is_empty());
        assert!(seed.iter().all(Template::is_default));
        assert!(seed.iter().all(|t| !t.available && t.local_file_path.is_none()));
    }

    #[test]
    fn download_urls_match_declared_architecture() {
        for t in templates_for(Architecture::Arm64) {
            if let Some(url) = &t.source_url {
                assert_eq!(t.architecture, Architecture::Arm64);
                assert!(!url.contains("amd64") && !url.contains("x86_64"), "{url}");
            }
        }
        for t in templates_for(Architecture::X64) {
            if let Some(url) = &t.source_url {
                assert_eq!(t.architecture, Architecture::X64);
                assert!(!url.contains("arm64") && !url.contains("aarch64"), "{url}");
            }
        }
    }

    #[test]
    fn seed_names_are_valid_and_unique() {
        let seed = default_templates();
        let mut names: Vec<_> = seed.iter().map(|t| t.name.as_str()).collect();
        for name in &names {
            assert!(wslkit_common::types::validate_name(name).is_ok());
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), seed.len());
    }
}
