//! Query Executor: the commit pipeline with in-flight deduplication

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::data::{errors::CoreError, identifiers::IntentKey, rows::RowSet};
use crate::services::transactions::{DuplicatePolicy, TransactionIntent};
use crate::traits::GraphBackend;

type CommitResult = Result<RowSet, CoreError>;
type InFlight = Arc<Mutex<HashMap<IntentKey, Vec<oneshot::Sender<CommitResult>>>>>;

/// Handle on the outcome of a submitted intent.
#[derive(Debug)]
pub struct CommitTicket {
    key: IntentKey,
    coalesced: bool,
    receiver: oneshot::Receiver<CommitResult>,
}

impl CommitTicket {
    pub fn key(&self) -> &IntentKey {
        &self.key
    }

    /// True when this ticket attached to a commit that was already in flight.
    pub fn coalesced(&self) -> bool {
        self.coalesced
    }

    pub async fn wait(self) -> CommitResult {
        let key = self.key;
        self.receiver
            .await
            .map_err(|_| CoreError::Internal(format!("commit for {} was abandoned", key)))?
    }
}

/// Sole caller of the graph backend.
///
/// Registration happens synchronously in `submit`, so the "at most one in-flight
/// commit per key" check is a map lookup made before anything is sent.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn GraphBackend>,
    in_flight: InFlight,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_in_flight(&self, key: &IntentKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Registers the intent and starts its commit, or attaches to the commit already
    /// running under the same key. Must be called from within a tokio runtime.
    pub fn submit(&self, intent: &TransactionIntent) -> Result<CommitTicket, CoreError> {
        let (sender, receiver) = oneshot::channel();

        {
            let mut in_flight = self.in_flight.lock();
            if let Some(waiters) = in_flight.get_mut(&intent.key) {
                return match intent.policy {
                    DuplicatePolicy::Coalesce => {
                        waiters.push(sender);
                        debug!(key = %intent.key, attached = waiters.len(), "Duplicate intent coalesced");
                        Ok(CommitTicket {
                            key: intent.key.clone(),
                            coalesced: true,
                            receiver,
                        })
                    }
                    DuplicatePolicy::Reject => {
                        warn!(key = %intent.key, "Duplicate intent rejected while in flight");
                        Err(CoreError::IntentInFlight {
                            key: intent.key.clone(),
                        })
                    }
                };
            }
            in_flight.insert(intent.key.clone(), vec![sender]);
        }

        let entry = InFlightEntry {
            key: intent.key.clone(),
            in_flight: Arc::clone(&self.in_flight),
            settled: false,
        };
        let backend = Arc::clone(&self.backend);
        let statements = intent.statements.clone();
        let span = info_span!("commit", key = %intent.key, kind = %intent.kind);

        tokio::spawn(
            async move {
                debug!(statements = statements.len(), "Committing transaction batch");
                let result = backend
                    .commit(&statements)
                    .await
                    .map_err(|e| CoreError::commit_failure(&entry.key, e));
                match &result {
                    Ok(rows) => info!(rows = rows.len(), "Commit succeeded"),
                    Err(e) => warn!(error = %e, "Commit failed"),
                }
                entry.settle(result);
            }
            .instrument(span),
        );

        Ok(CommitTicket {
            key: intent.key.clone(),
            coalesced: false,
            receiver,
        })
    }

    /// Submits and awaits the row-set.
    pub async fn commit(&self, intent: &TransactionIntent) -> CommitResult {
        self.submit(intent)?.wait().await
    }
}

/// Owns a key's slot in the in-flight map for the lifetime of its commit task.
/// If the task dies before settling, the slot is still released.
struct InFlightEntry {
    key: IntentKey,
    in_flight: InFlight,
    settled: bool,
}

impl InFlightEntry {
    fn settle(mut self, result: CommitResult) {
        let waiters = self.in_flight.lock().remove(&self.key).unwrap_or_default();
        self.settled = true;
        for waiter in waiters {
            // Callers that stopped listening are fine to skip.
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        if !self.settled {
            self.in_flight.lock().remove(&self.key);
        }
    }
}
