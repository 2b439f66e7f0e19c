//! Error types for the preview engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the preview run.

/// Top-level error for the preview engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: navicue_core::ConfigError,
    },

    /// Catalogue construction or lookup failed.
    #[error("catalogue error: {source}")]
    Catalogue {
        /// The underlying catalogue error.
        #[from]
        source: navicue_catalogue::CatalogueError,
    },

    /// The selected module could not be mounted.
    #[error("module error: {source}")]
    Module {
        /// The underlying module error.
        #[from]
        source: navicue_core::ModuleError,
    },

    /// The driver task panicked or was cancelled.
    #[error("driver error: {message}")]
    Driver {
        /// Description of the driver failure.
        message: String,
    },
}
