//! A reference [`AnalysisHost`](ts_ls_core::analysis::AnalysisHost) implementation.
//!
//! `ts-ls-core` treats the real TypeScript analysis engine as an opaque
//! external collaborator; this crate is not that engine. It is a small,
//! deterministic stand-in used to exercise the orchestration core end to
//! end — good enough to answer "where is this declared", "what's its
//! type", "what symbols does this workspace have" for the toy inputs the
//! workspace's own test scenarios use, nothing more.

pub mod mock;

pub use mock::MockAnalysisHost;
