//! Hand-written fakes for the core's collaborators, plus row builders.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

use crate::data::{
    entities::{Node, Relationship},
    errors::BackendError,
    rows::{node_columns, relationship_columns, triple_columns, Row, RowSet},
    types::{DataPacket, Properties},
};
use crate::services::mode::InteractionMode;
use crate::services::reconciler::Diff;
use crate::services::transactions::Statement;
use crate::traits::{DiagramRenderer, GraphBackend, NodeFormPresenter, Notice, RenderHint};

type BackendResult = Result<RowSet, BackendError>;

#[derive(Default)]
struct GateState {
    holding: AtomicBool,
    held: Mutex<BTreeMap<usize, (BackendResult, oneshot::Sender<BackendResult>)>>,
    arrived: Notify,
}

/// Controls when held backend calls answer.
///
/// Calls are numbered from 0 in arrival order. Each one takes its scripted result
/// when it arrives; the gate decides when that result is delivered.
#[derive(Clone)]
pub struct ResponseGate {
    state: Arc<GateState>,
}

impl ResponseGate {
    /// Answers every held call and stops holding new ones.
    pub fn release(&self) {
        self.state.holding.store(false, Ordering::SeqCst);
        let held = std::mem::take(&mut *self.state.held.lock());
        for (_, (result, responder)) in held {
            let _ = responder.send(result);
        }
    }

    /// Answers one held call, leaving the others waiting.
    pub fn release_call(&self, call: usize) -> bool {
        match self.state.held.lock().remove(&call) {
            Some((result, responder)) => {
                let _ = responder.send(result);
                true
            }
            None => false,
        }
    }

    pub fn held_count(&self) -> usize {
        self.state.held.lock().len()
    }

    /// Waits until at least `count` calls are parked at the gate.
    pub async fn wait_for_held(&self, count: usize) {
        loop {
            let arrived = self.state.arrived.notified();
            if self.held_count() >= count {
                return;
            }
            arrived.await;
        }
    }
}

/// Scripted `GraphBackend`.
///
/// Results are consumed in call order; an exhausted script answers with an empty
/// row-set. Every statement batch is recorded.
#[derive(Default)]
pub struct FakeGraphBackend {
    script: Mutex<VecDeque<BackendResult>>,
    calls: Mutex<Vec<Vec<Statement>>>,
    commit_count: AtomicUsize,
    gate: Arc<GateState>,
}

impl FakeGraphBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: RowSet) {
        self.script.lock().push_back(Ok(rows));
    }

    pub fn push_error(&self, error: BackendError) {
        self.script.lock().push_back(Err(error));
    }

    /// Parks every call until the returned gate lets it through.
    pub fn hold_responses(&self) -> ResponseGate {
        self.gate.holding.store(true, Ordering::SeqCst);
        ResponseGate {
            state: Arc::clone(&self.gate),
        }
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Vec<Statement>> {
        self.calls.lock().clone()
    }

    /// Cypher text of every statement sent so far, flattened.
    pub fn cypher_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .flatten()
            .map(|s| s.cypher.clone())
            .collect()
    }
}

#[async_trait]
impl GraphBackend for FakeGraphBackend {
    async fn commit(&self, statements: &[Statement]) -> Result<RowSet, BackendError> {
        let call = self.commit_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(statements.to_vec());
        let result = self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()));

        if !self.gate.holding.load(Ordering::SeqCst) {
            return result;
        }

        let (responder, receiver) = oneshot::channel();
        self.gate.held.lock().insert(call, (result, responder));
        self.gate.arrived.notify_waiters();
        receiver
            .await
            .unwrap_or_else(|_| Err(BackendError::Connection("fake backend dropped".into())))
    }
}

/// Everything a renderer was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Apply { diff: Diff, hint: Option<RenderHint> },
    ModeChanged(InteractionMode),
    Notify(Notice),
}

#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    pub fn diffs(&self) -> Vec<Diff> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::Apply { diff, .. } => Some(diff.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn hints(&self) -> Vec<RenderHint> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::Apply { hint, .. } => *hint,
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::Notify(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn modes(&self) -> Vec<InteractionMode> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::ModeChanged(m) => Some(*m),
                _ => None,
            })
            .collect()
    }
}

impl DiagramRenderer for RecordingRenderer {
    fn apply(&self, diff: &Diff, hint: Option<RenderHint>) {
        self.calls.lock().push(RenderCall::Apply {
            diff: diff.clone(),
            hint,
        });
    }

    fn mode_changed(&self, mode: InteractionMode) {
        self.calls.lock().push(RenderCall::ModeChanged(mode));
    }

    fn notify(&self, notice: &Notice) {
        self.calls.lock().push(RenderCall::Notify(notice.clone()));
    }
}

#[derive(Default)]
pub struct RecordingFormPresenter {
    nodes: Mutex<Vec<Node>>,
    relationships: Mutex<Vec<Relationship>>,
}

impl RecordingFormPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented_nodes(&self) -> Vec<Node> {
        self.nodes.lock().clone()
    }

    pub fn presented_relationships(&self) -> Vec<Relationship> {
        self.relationships.lock().clone()
    }
}

impl NodeFormPresenter for RecordingFormPresenter {
    fn present_node(&self, node: &Node) {
        self.nodes.lock().push(node.clone());
    }

    fn present_relationship(&self, relationship: &Relationship) {
        self.relationships.lock().push(relationship.clone());
    }
}

fn properties(pairs: &[(&str, &str)]) -> DataPacket {
    let props: Properties = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), DataPacket::from(*v)))
        .collect();
    DataPacket::Object(props)
}

fn labels(labels: &[&str]) -> DataPacket {
    DataPacket::Array(labels.iter().map(|l| DataPacket::from(*l)).collect())
}

/// A row of the node shape.
pub fn node_row(id: i64, node_labels: &[&str], props: &[(&str, &str)]) -> Row {
    Row::from([
        (node_columns::NODE.to_string(), properties(props)),
        (node_columns::ID.to_string(), DataPacket::Integer(id)),
        (node_columns::LABELS.to_string(), labels(node_labels)),
    ])
}

/// A row of the triple shape; `start` is the id the relationship leaves from.
pub fn triple_row(a: i64, rel_type: &str, b: i64, start: i64) -> Row {
    use triple_columns::*;
    Row::from([
        (SOURCE.to_string(), properties(&[])),
        (SOURCE_ID.to_string(), DataPacket::Integer(a)),
        (SOURCE_LABELS.to_string(), labels(&[])),
        (REL.to_string(), properties(&[])),
        (REL_TYPE.to_string(), DataPacket::from(rel_type)),
        (REL_START.to_string(), DataPacket::Integer(start)),
        (TARGET.to_string(), properties(&[])),
        (TARGET_ID.to_string(), DataPacket::Integer(b)),
        (TARGET_LABELS.to_string(), labels(&[])),
    ])
}

/// A row of the bare relationship shape, directed `start -> end`.
pub fn relationship_row(start: i64, rel_type: &str, end: i64) -> Row {
    use relationship_columns::*;
    Row::from([
        (REL.to_string(), properties(&[])),
        (REL_TYPE.to_string(), DataPacket::from(rel_type)),
        (START.to_string(), DataPacket::Integer(start)),
        (END.to_string(), DataPacket::Integer(end)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_releases_calls_out_of_order() {
        let backend = Arc::new(FakeGraphBackend::new());
        let gate = backend.hold_responses();
        backend.push_rows(vec![node_row(1, &[], &[])]);
        backend.push_rows(vec![node_row(2, &[], &[])]);

        let first = tokio::spawn({
            let backend = backend.clone();
            async move { backend.commit(&[]).await }
        });
        gate.wait_for_held(1).await;
        let second = tokio::spawn({
            let backend = backend.clone();
            async move { backend.commit(&[]).await }
        });
        gate.wait_for_held(2).await;

        assert!(gate.release_call(1));
        let rows = second.await.unwrap().unwrap();
        assert_eq!(rows[0][node_columns::ID], DataPacket::Integer(2));

        gate.release();
        let rows = first.await.unwrap().unwrap();
        assert_eq!(rows[0][node_columns::ID], DataPacket::Integer(1));
        assert_eq!(backend.commit_count(), 2);
    }
}
