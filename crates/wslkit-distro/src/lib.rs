//! # wslkit-distro
//!
//! Template catalog management for wslkit.
//!
//! Handles:
//! - **Catalog**: durable JSON catalog of templates with serialized mutation.
//! - **Hashing**: streaming SHA-256 verification of archives.
//! - **Archives**: tar / tar.gz format inspection.
//! - **Registry lookup**: the official distribution index.
//! - **Downloads**: the multi-stage acquisition chain with progress reporting.
//! - **Manager**: catalog CRUD, availability, verification, and storage stats.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod archive;
pub mod download;
pub mod hash;
pub mod http;
pub mod lookup;
pub mod manager;
pub mod seed;
pub mod store;
pub mod template;
