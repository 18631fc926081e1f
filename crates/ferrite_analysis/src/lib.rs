//! Analysis host for the ferrite semantic core
//!
//! Owns the workspace and hands out immutable [`Analysis`] snapshots. A
//! snapshot answers macro expansion, path and scope resolution, and
//! inference queries, and collects the diagnostics of a crate.

mod config;
mod diagnostics;
mod host;

pub use config::{AnalysisConfig, ConfigError};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSource, Severity};
pub use host::{Analysis, AnalysisHost};
