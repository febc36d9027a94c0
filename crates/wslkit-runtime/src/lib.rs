//! Image lifecycle management for wslkit.
//!
//! An image is a live instance registered with the external tool. This
//! crate creates images from catalog templates, clones them, and keeps two
//! side stores next to the tool's own state: a per-image provenance
//! manifest and a registry of image metadata.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod lifecycle;
pub mod manifest;
pub mod name_lock;
pub mod registry;
