//! The find endpoint seam.

use std::future::Future;

use sofa_common::utils::error::Result;

use crate::wire::{FindRequest, FindResponse};

/// Sends find requests to a database.
///
/// Implementations own the transport (HTTP, in-memory, recorded fixtures).
/// Dropping the returned future cancels the request.
pub trait FindSender: Send + Sync {
    /// Runs `request` against `database` and returns the matching documents.
    fn find(
        &self,
        database: &str,
        request: &FindRequest,
    ) -> impl Future<Output = Result<FindResponse>> + Send;
}
