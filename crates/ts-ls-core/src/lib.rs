//! Workspace orchestration core for a TypeScript/JavaScript language server.
//!
//! This crate owns everything around the analyzer: the virtual file system,
//! package/project discovery, reference-closure traversal, and the JSON-RPC
//! dispatcher. It treats the analyzer itself as an opaque collaborator behind
//! the [`analysis::AnalysisHost`] trait — a concrete implementation (or a
//! test double) lives in a separate crate and is supplied at construction
//! time.

pub mod analysis;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod packages;
pub mod patch;
pub mod position;
pub mod project;
pub mod refclosure;
pub mod source;
pub mod transport;
pub mod updater;
pub mod uri;
pub mod vfs;

pub use error::{CoreError, CoreResult};
pub use uri::Uri;
