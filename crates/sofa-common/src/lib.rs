//! # sofa-common
//!
//! Foundation layer for Sofa: values, naming conventions, and errors.
//!
//! This crate provides the building blocks shared by the query compiler and
//! the client facade. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions ([`Value`], [`FieldPath`], [`JsonType`])
//! - [`naming`] - Property and document naming conventions
//! - [`utils`] - Utility functions and helpers (errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod naming;
pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use naming::{DocumentCase, FieldNaming, PropertyCase};
pub use types::{FieldPath, JsonType, Value};
pub use utils::error::{Error, Result};
