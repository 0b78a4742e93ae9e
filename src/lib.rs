// lib.rs

//! The elements that drive the `loglens` binary.
//!
//! Data flows leaves-first:
//!
//! - [`reader`] opens, inspects, reads and follows raw log files.
//! - [`plugin`] knows where each server keeps its logs and how to parse them.
//! - [`store`] persists per-plugin settings and catalogs scanned files.
//! - [`parser`] turns raw lines into [`ParsedEntry`]s using plugins or custom regexes.
//! - [`analytics`] and [`summary`] aggregate parsed (or classified) lines over bounded scans.
//! - [`realtime`] pushes followed lines to WebSocket clients.
//! - [`api`] exposes all of the above over HTTP, tuned by [`config`].

#![warn(
    explicit_outlives_requirements,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_docs,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_lifetimes,
    clippy::cargo,
    clippy::pedantic
)]

pub mod analytics;
pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod parser;
pub mod plugin;
pub mod reader;
pub mod realtime;
pub mod store;
pub mod summary;
pub mod synth;

#[cfg(test)]
pub mod test;

pub use cancel::Cancel;
pub use error::{Error, FileFailure, Result};
pub use parser::ParsedEntry;
pub use reader::RawLine;
