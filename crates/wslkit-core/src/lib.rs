//! # wslkit-core
//!
//! Primitives for driving the external virtualization tool.
//!
//! This crate provides:
//! - **Command execution**: argument-vector process spawning with timeouts,
//!   termination of overdue processes, and console output decoding.
//! - **WSL adapter**: typed `list`/`import`/`export`/`unregister`/`install`
//!   calls on top of a [`CommandRunner`](exec::CommandRunner).
//! - **Privileges**: detection of an elevated caller.
//!
//! No shell strings are ever built: every invocation is a program plus an
//! argument vector.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod exec;
pub mod privilege;
pub mod wsl;
