// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised while building a [`MetricsConfiguration`](crate::MetricsConfiguration)
/// or a [`FilterEngine`](crate::FilterEngine).
///
/// Configuration errors are the only errors that fail fast: a filter set that
/// cannot be compiled is refused instead of being guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A filter list contained an empty (or whitespace-only) pattern.
    #[error("filter pattern must not be empty")]
    EmptyPattern,
    /// A filter pattern could not be compiled.
    #[error("invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending glob, as written in the configuration
        pattern: String,
        /// Why it was rejected
        reason: String,
    },
    /// A configuration value was present but malformed.
    #[error("invalid value for '{key}': {value}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// The rejected value or a description of the parse failure
        value: String,
    },
}

/// Represents errors that can occur in the instrumentation engine.
///
/// None of these errors ever reach the instrumented (host) code path. They are
/// returned from construction-time APIs ([`MetricsRegistry::build`](crate::MetricsRegistry::build),
/// [`BufferedBackend::spawn`](crate::BufferedBackend::spawn)) or logged at the module boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed filter pattern or invalid configuration value
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// A module could not attach to the runtime's extension points
    #[error("failed to install module '{module}': {reason}")]
    Installation {
        /// Id of the module that failed to install
        module: &'static str,
        /// Additional context about the failure
        reason: String,
    },
    /// Unexpected condition while computing or forwarding a metric
    #[error("metric emission failed in module '{module}': {details}")]
    Emission {
        /// Id of the module whose emission failed
        module: &'static str,
        /// Additional context about the failure
        details: String,
    },
    /// The backend rejected or failed a metric
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// A Result type specialized for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
