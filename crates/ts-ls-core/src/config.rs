//! Server configuration (§6 Environment).
//!
//! One real knob (`strict`) plus the ambient logging/concurrency overrides
//! the teacher's config surface always carries alongside its domain-specific
//! setting.

/// Server-wide configuration, constructed once at startup and never mutated
/// afterwards (mirrors [`crate::vfs::LibraryBundle`]'s immutability).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// When `true`, the workspace never constructs a [`crate::source::LocalSource`];
    /// all file content must come from editor RPCs.
    pub strict: bool,
    /// Maximum concurrent in-flight source reads (see [`crate::updater::Updater`]).
    pub max_in_flight_reads: usize,
    /// Maximum reference-closure recursion depth (§4.G).
    pub max_reference_depth: u32,
    /// `tracing-subscriber` `EnvFilter` directive string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            strict: false,
            max_in_flight_reads: crate::updater::DEFAULT_MAX_IN_FLIGHT,
            max_reference_depth: crate::refclosure::DEFAULT_MAX_DEPTH,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Applies the `strict` flag from the `TS_LS_STRICT` environment
    /// variable (`1`/`true`, case-insensitive) on top of `self`, mirroring
    /// the CLI-plus-env-fallback convention: CLI flags are parsed by the
    /// binary crate and passed in explicitly; this only covers the
    /// env-only knobs a library consumer (like a test) might want without
    /// going through `clap`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("TS_LS_STRICT") {
            self.strict = matches!(value.to_ascii_lowercase().as_str(), "1" | "true");
        }
        if let Ok(value) = std::env::var("RUST_LOG") {
            self.log_level = value;
        }
        self
    }
}
