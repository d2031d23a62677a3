//! GraphBackend trait definition for committing statement batches

use async_trait::async_trait;

use crate::data::{errors::BackendError, rows::RowSet};
use crate::services::transactions::Statement;

/// Represents the remote graph query service.
///
/// Contract: the statements are executed as one atomic transaction, in order.
/// The rows of every statement are concatenated into a single row-set. A failure
/// in any statement rolls the whole batch back and is reported as a classified
/// `BackendError`; a partial row-set is never returned.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn commit(&self, statements: &[Statement]) -> Result<RowSet, BackendError>;
}
