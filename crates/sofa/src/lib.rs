//! # Sofa
//!
//! A typed, composable query layer for document databases that speak a
//! Mango-style find API.
//!
//! Start with a [`Client`]: it owns the transport (anything implementing
//! [`FindSender`]) and the naming [`Config`]. From there, [`Database`]
//! handles hand out [`Query`] builders that compile to a single find request
//! and finish whatever the server cannot answer on the client.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde::Deserialize;
//! use serde_json::json;
//! use sofa::{Client, MemoryDatabase, field};
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Character {
//!     name: String,
//!     is_jedi: bool,
//! }
//!
//! let fixture = MemoryDatabase::new().with_database(
//!     "character",
//!     vec![json!({"name": "Luke", "isJedi": true})],
//! );
//! let client = Client::new(fixture);
//! let characters = client.database_for::<Character>();
//!
//! // Inspect the request without sending it
//! let query = characters.query().filter(field("is_jedi").eq(true)).take(1);
//! assert_eq!(
//!     query.to_query_string()?,
//!     r#"{"selector":{"isJedi":true},"limit":1}"#
//! );
//! # Ok::<(), sofa::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod database;
pub mod memory;
pub mod query;

pub use client::Client;
pub use config::Config;
pub use database::Database;
pub use memory::{MemoryDatabase, RecordedRequest};
pub use query::{FindResult, Query};

// Re-export the pieces needed to build predicates and plug in transports
pub use sofa_common::naming::{DocumentCase, PropertyCase};
pub use sofa_common::utils::error::{
    DatabaseError, DatabaseErrorKind, Error, QueryError, QueryErrorKind, Result, SequenceError,
};
pub use sofa_common::{FieldPath, JsonType, Value};
pub use sofa_query::builder::{field, flag, item, lit, list};
pub use sofa_query::{
    Classification, ClassificationTable, CompiledQuery, ExecutionStats, Expression, FindRequest,
    FindResponse, FindSender, OperationKind, QueryPlan,
};
