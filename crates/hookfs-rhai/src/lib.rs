//! Rhai host runtime for hookfs.
//!
//! Provides [`RhaiInterp`], a Rhai interpreter that implements the
//! [`hookfs_core::Environment`] contract, so scripts can mount
//! filesystems with `vfs_filesystem("mount", ...)` and exercise them with
//! the `file_*` and `chan_*` host functions.

mod commands;
pub mod config;
pub mod convert;
pub mod interp;
pub mod pattern;

pub use config::EngineLimits;
pub use interp::RhaiInterp;
pub use pattern::glob_match;
