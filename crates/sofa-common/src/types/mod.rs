//! Core type definitions for Sofa.
//!
//! - Literal values used by predicates and results ([`Value`])
//! - Member paths inside a document ([`FieldPath`])
//! - Wire-level JSON type tags ([`JsonType`])

mod path;
mod value;

pub use path::FieldPath;
pub use value::{JsonType, Value};
