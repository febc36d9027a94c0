//! Formatted output helpers for CLI commands.
//!
//! Provides aligned tables, human-readable byte sizes, download progress
//! lines and error hints.

use std::fmt::Write as _;

use serde::Serialize;
use wslkit_common::error::{ErrorKind, WslkitError};
use wslkit_distro::http::DownloadProgress;

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats an optional size, rendering `None` as `-`.
#[must_use]
pub fn format_size(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "-".to_string(), format_bytes)
}

/// Renders rows as a left-aligned table with a header line.
#[must_use]
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    render_row(&mut out, headers.iter().copied(), &widths);
    for row in rows {
        render_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn render_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let rendered: Vec<String> = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", rendered.join("  ").trim_end());
}

/// Prints a table, or `empty` when there are no rows.
pub fn print_table(headers: &[&str], rows: &[Vec<String>], empty: &str) {
    if rows.is_empty() {
        println!("{empty}");
    } else {
        print!("{}", render_table(headers, rows));
    }
}

/// Prints `value` as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Renders a progress event as a single status line.
#[must_use]
pub fn progress_line(name: &str, progress: DownloadProgress) -> String {
    match progress.total {
        Some(total) => format!(
            "{name}: {:>3}% ({} / {})",
            progress.percent,
            format_bytes(progress.downloaded),
            format_bytes(total)
        ),
        None => format!("{name}: {} downloaded", format_bytes(progress.downloaded)),
    }
}

/// Suggests a next step for errors a user can act on.
#[must_use]
pub fn hint(error: &WslkitError) -> Option<&'static str> {
    match error.kind() {
        ErrorKind::NotAvailable => {
            Some("download the template first with `wslkit distro pull <name>`")
        }
        ErrorKind::AlreadyExists => Some("choose another name or delete the existing image"),
        ErrorKind::IntegrityMismatch => {
            Some("the archive is corrupt or was tampered with; remove and pull it again")
        }
        ErrorKind::NetworkFailure => Some("check connectivity, or retry with a mirror configured"),
        ErrorKind::ExternalToolFailure => {
            Some("make sure WSL is installed and `wsl.exe` is on PATH")
        }
        ErrorKind::InvalidInput => {
            Some("names may only contain letters, digits, '.', '_' and '-'")
        }
        ErrorKind::NotFound | ErrorKind::IoFailure => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_kib() {
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(134_217_728), "128.0 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }

    #[test]
    fn table_aligns_columns() {
        let rows = vec![
            vec!["ubuntu-22.04".to_string(), "yes".to_string()],
            vec!["alpine".to_string(), "no".to_string()],
        ];
        let table = render_table(&["NAME", "AVAILABLE"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "NAME          AVAILABLE");
        assert_eq!(lines[1], "ubuntu-22.04  yes");
        assert_eq!(lines[2], "alpine        no");
    }

    #[test]
    fn progress_line_without_total() {
        let line = progress_line(
            "alpine",
            DownloadProgress {
                percent: 0,
                downloaded: 2048,
                total: None,
            },
        );
        assert_eq!(line, "alpine: 2.0 KiB downloaded");
    }

    #[test]
    fn hints_follow_error_kind() {
        let err = WslkitError::NotAvailable {
            kind: "template",
            id: "alpine".to_string(),
            reason: "no local archive".to_string(),
        };
        assert!(hint(&err).is_some_and(|h| h.contains("distro pull")));
        let err = WslkitError::NotFound {
            kind: "image",
            id: "x".to_string(),
        };
        assert!(hint(&err).is_none());
    }
}
