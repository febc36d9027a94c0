//! # wslkit-common
//!
//! Shared types, error definitions, configuration models, constants, and
//! the on-disk storage layout used across the entire wslkit workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the catalog, runtime
//! and CLI crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod fs;
pub mod layout;
pub mod types;
