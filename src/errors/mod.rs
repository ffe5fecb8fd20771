//! Centralized error handling for the donor search engine
//!
//! This module provides the error types shared by every layer of the crate,
//! from the geohash cache up to the search orchestrator.
//!
//! # Error Categories
//!
//! - **Repository Errors**: location store and search-progress store failures
//! - **Cache Errors**: invalid cache construction parameters, size accounting
//! - **Validation Errors**: malformed search requests and donor locations
//! - **Configuration Errors**: invalid or inconsistent configuration values
//!
//! # Usage
//!
//! ```rust
//! use donor_search::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     // Function can return any error type that converts to AppError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for cache Results
pub type CacheResult<T> = Result<T, CacheError>;
