//! Domain primitive types used across the wslkit workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_NAME_LENGTH, SHA256_HEX_LENGTH};
use crate::error::{Result, WslkitError};

/// Unique identifier for an image (a live instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random image ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hash digest used for content verification.
///
/// Always stored as 64 lowercase hex characters; deserialization goes
/// through [`Sha256Hash::from_hex`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// Accepts an optional `sha256:` or `0x` prefix and either letter case,
    /// as published by distribution indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self> {
        let raw = hex.as_ref().trim();
        let stripped = raw
            .strip_prefix("sha256:")
            .or_else(|| raw.strip_prefix("0x"))
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if stripped.len() != SHA256_HEX_LENGTH || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WslkitError::InvalidInput {
                message: format!("invalid SHA-256 hex string: {raw}"),
            });
        }
        Ok(Self(stripped.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sha256Hash {
    type Error = WslkitError;

    fn try_from(hex: String) -> Result<Self> {
        Self::from_hex(hex)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// CPU architecture a template is built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 64-bit x86.
    #[default]
    X64,
    /// 64-bit ARM.
    Arm64,
    /// Multi-architecture archive.
    Both,
}

impl Architecture {
    /// Returns the architecture of the running host.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else {
            Self::X64
        }
    }

    /// Returns whether an archive for `self` can run on `host`.
    #[must_use]
    pub fn supports(self, host: Self) -> bool {
        self == Self::Both || self == host
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X64 => write!(f, "x64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Validates a template or image name.
///
/// Names become file names (`<name>.tar`, `<name>.json`) and arguments of the
/// external tool, so they are restricted to `[A-Za-z0-9._-]`, must not start
/// with `-` or `.`, and are at most 64 characters long.
///
/// # Errors
///
/// Returns `WslkitError::InvalidInput` describing the first violation.
pub fn validate_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(WslkitError::InvalidInput {
            message: format!("invalid name {name:?}: {reason}"),
        })
    };
    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return reject("too long");
    }
    if name.starts_with('-') || name.starts_with('.') {
        return reject("must not start with '-' or '.'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return reject("only letters, digits, '.', '_' and '-' are allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_accepts_prefixes_and_uppercase() {
        let plain = Sha256Hash::from_hex(HEX).unwrap();
        let prefixed = Sha256Hash::from_hex(format!("sha256:{HEX}")).unwrap();
        let upper = Sha256Hash::from_hex(format!("0x{}", HEX.to_uppercase())).unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(plain, upper);
        assert_eq!(plain.to_string(), format!("sha256:{HEX}"));
    }

    #[test]
    fn sha256_rejects_short_input() {
        assert!(Sha256Hash::from_hex("abcdef").is_err());
    }

    #[test]
    fn sha256_serializes_as_plain_hex() {
        let hash = Sha256Hash::from_hex(HEX).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{HEX}\""));
    }

    #[test]
    fn sha256_deserialization_normalizes() {
        let upper: Sha256Hash = serde_json::from_str(&format!("\"{}\"", HEX.to_uppercase())).unwrap();
        let prefixed: Sha256Hash = serde_json::from_str(&format!("\"sha256:{HEX}\"")).unwrap();
        assert_eq!(upper.as_hex(), HEX);
        assert_eq!(prefixed.as_hex(), HEX);
        assert!(serde_json::from_str::<Sha256Hash>("\"not-a-hash\"").is_err());
    }

    #[test]
    fn architecture_uses_lowercase_names() {
        let json = serde_json::to_string(&Architecture::Arm64).unwrap();
        assert_eq!(json, "\"arm64\"");
        assert!(Architecture::Both.supports(Architecture::X64));
        assert!(!Architecture::Arm64.supports(Architecture::X64));
    }

    #[test]
    fn validate_name_accepts_typical_names() {
        assert!(validate_name("ubuntu-22.04").is_ok());
        assert!(validate_name("Alpine_3.19").is_ok());
    }

    #[test]
    fn validate_name_rejects_option_like_and_path_like_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("--help").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a b").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
    }
}
