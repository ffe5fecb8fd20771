//! Error type definitions for the donor search engine
//!
//! Store errors are never swallowed: they travel up to the entry point
//! unchanged so the invoking layer can retry from the last persisted
//! search progress.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the engine.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Geohash cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Store connection failures
    #[error("Store connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Query execution failures
    #[error("Query failed: {query} - {message}")]
    QueryFailed { query: String, message: String },

    /// A stored row could not be decoded into its domain type
    #[error("Invalid record: {field} - {message}")]
    InvalidRecord { field: String, message: String },

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Geohash cache specific errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Construction parameter is not a positive whole number
    #[error("Invalid cache parameter: {parameter} = {value} (must be a positive integer)")]
    InvalidParameter { parameter: String, value: String },

    /// Value could not be serialized for size accounting
    #[error("Failed to measure cache value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl RepositoryError {
    /// Create an invalid record error for a malformed stored field
    pub fn invalid_record<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidRecord {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a query failure error
    pub fn query_failed<Q: Into<String>, M: Into<String>>(query: Q, message: M) -> Self {
        Self::QueryFailed {
            query: query.into(),
            message: message.into(),
        }
    }
}

impl CacheError {
    pub fn invalid_parameter<P: Into<String>, V: ToString>(parameter: P, value: V) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }
}
