//! Graph controller: turns UI events into intents and renders what comes back.
//!
//! Every event is split in two. [`GraphController::begin`] runs synchronously:
//! it checks the interaction mode, builds the intent, inserts optimistic
//! placeholders and registers the commit with the executor. Events therefore
//! take effect in the order they are begun. [`GraphController::finish`] awaits
//! the commit and merges the rows, so responses can complete in any order.
//!
//! Failures never leave a partial merge behind. The renderer gets a [`Notice`],
//! and a failed or stale CreateNode has its placeholder rolled back.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::data::{
    entities::{Coordinates, Relationship},
    errors::CoreError,
    identifiers::{EntityId, NodeRef},
    types::{DataPacket, Properties},
};
use crate::factory::EntityFactory;
use crate::services::executor::{CommitTicket, QueryExecutor};
use crate::services::messages::{EventOutcome, UiEvent};
use crate::services::mode::{InteractionMode, ModeStateMachine};
use crate::services::reconciler::{Diff, GraphReconciler, GraphSnapshot};
use crate::services::transactions::{Intent, IntentKind, TransactionBuilder, TransactionIntent};
use crate::traits::{DiagramRenderer, GraphBackend, NodeFormPresenter, Notice, NoticeLevel, RenderHint};

/// What to do with a merged result beyond rendering its diff.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FollowUp {
    None,
    /// Open the edit form of this node.
    PresentNode(EntityId),
    /// Keep the view on this node.
    CenterOn(EntityId),
    /// Place the created node where the gesture happened and open its form.
    PlaceCreated(Coordinates),
}

/// An event whose commit has been registered but not awaited.
#[derive(Debug)]
pub struct PendingCommit {
    intent: TransactionIntent,
    ticket: CommitTicket,
    follow_up: FollowUp,
}

impl PendingCommit {
    pub fn intent(&self) -> &TransactionIntent {
        &self.intent
    }

    pub fn coalesced(&self) -> bool {
        self.ticket.coalesced()
    }
}

/// Result of the synchronous half of event handling.
#[derive(Debug)]
pub enum BegunEvent {
    /// Nothing left to await.
    Done(EventOutcome),
    Commit(PendingCommit),
}

#[derive(Clone)]
pub struct GraphController {
    builder: TransactionBuilder,
    executor: QueryExecutor,
    reconciler: Arc<Mutex<GraphReconciler>>,
    modes: Arc<Mutex<ModeStateMachine>>,
    renderer: Arc<dyn DiagramRenderer>,
    forms: Arc<dyn NodeFormPresenter>,
}

impl GraphController {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        renderer: Arc<dyn DiagramRenderer>,
        forms: Arc<dyn NodeFormPresenter>,
        builder: TransactionBuilder,
    ) -> Self {
        Self {
            builder,
            executor: QueryExecutor::new(backend),
            reconciler: Arc::new(Mutex::new(GraphReconciler::new(EntityFactory::new()))),
            modes: Arc::new(Mutex::new(ModeStateMachine::new())),
            renderer,
            forms,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.modes.lock().mode()
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Runs `f` against the graph model under its lock.
    pub fn with_model<R>(&self, f: impl FnOnce(&GraphReconciler) -> R) -> R {
        f(&self.reconciler.lock())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.reconciler.lock().snapshot()
    }

    /// Clears the diagram model. In-flight results still merge afterwards.
    pub fn reset(&self) {
        self.reconciler.lock().reset();
    }

    /// Handles an event to completion.
    pub async fn handle(&self, event: UiEvent) -> Result<EventOutcome, CoreError> {
        match self.begin(event)? {
            BegunEvent::Done(outcome) => Ok(outcome),
            BegunEvent::Commit(pending) => self.finish(pending).await,
        }
    }

    /// Synchronous half: mode check, intent build, optimistic insert, registration.
    /// Must be called from within a tokio runtime.
    pub fn begin(&self, event: UiEvent) -> Result<BegunEvent, CoreError> {
        let event_name = event.name();
        debug!(event = event_name, "Beginning event");
        self.try_begin(event).map_err(|e| {
            self.report(&e);
            e
        })
    }

    fn try_begin(&self, event: UiEvent) -> Result<BegunEvent, CoreError> {
        match event {
            UiEvent::NodeClick(id) => {
                self.submit(Intent::FetchNode(id), FollowUp::PresentNode(id))
            }
            UiEvent::NodeDoubleClick(id) => {
                self.submit(Intent::ExpandNode(id), FollowUp::CenterOn(id))
            }
            UiEvent::RelationshipClick(key) => {
                let relationship = self.reconciler.lock().relationship(&key).cloned();
                let relationship = relationship.ok_or_else(|| {
                    CoreError::InvalidIntent(format!("relationship {} is not on the diagram", key))
                })?;
                self.forms.present_relationship(&relationship);
                Ok(BegunEvent::Done(EventOutcome::Presented))
            }
            UiEvent::CreateModeToggle => {
                let transition = self.modes.lock().toggle();
                self.renderer.mode_changed(transition.to);
                Ok(BegunEvent::Done(EventOutcome::ModeChanged(transition)))
            }
            UiEvent::NodeCreateGesture { at } => self.begin_create_node(at),
            UiEvent::RelationshipCreateGesture {
                source,
                target,
                rel_type,
                properties,
            } => self.begin_create_relationship(source, target, rel_type.as_deref(), properties),
            UiEvent::SearchSubmit { queries, shape } => {
                self.submit(Intent::Search { queries, shape }, FollowUp::None)
            }
            UiEvent::NodeFormSubmit(node) => {
                self.submit(Intent::MergeNodeEdit { node }, FollowUp::None)
            }
            UiEvent::RelationshipFormSubmit(relationship) => {
                self.submit(Intent::MergeRelationshipEdit { relationship }, FollowUp::None)
            }
        }
    }

    fn submit(&self, intent: Intent, follow_up: FollowUp) -> Result<BegunEvent, CoreError> {
        let context = self.modes.lock().authorize(intent.kind())?;
        let intent = self.builder.build(intent, context)?;
        let ticket = self.executor.submit(&intent)?;
        Ok(BegunEvent::Commit(PendingCommit {
            intent,
            ticket,
            follow_up,
        }))
    }

    fn begin_create_node(&self, at: Coordinates) -> Result<BegunEvent, CoreError> {
        let context = self.modes.lock().authorize(IntentKind::CreateNode)?;
        let placeholder = {
            let reconciler = self.reconciler.lock();
            self.builder.placeholder(reconciler.factory())
        };
        let intent = self.builder.build(
            Intent::CreateNode {
                placeholder: placeholder.clone(),
            },
            context,
        )?;

        let diff = self.reconciler.lock().insert_placeholder(placeholder.clone())?;
        self.renderer.apply(
            &diff,
            Some(RenderHint::PlaceAt {
                node: placeholder.id,
                at,
            }),
        );

        match self.executor.submit(&intent) {
            Ok(ticket) => Ok(BegunEvent::Commit(PendingCommit {
                intent,
                ticket,
                follow_up: FollowUp::PlaceCreated(at),
            })),
            Err(e) => {
                self.roll_back(&intent);
                Err(e)
            }
        }
    }

    fn begin_create_relationship(
        &self,
        source: NodeRef,
        target: NodeRef,
        rel_type: Option<&str>,
        properties: Properties,
    ) -> Result<BegunEvent, CoreError> {
        let context = self.modes.lock().authorize(IntentKind::CreateRelationship)?;
        let rel_type = self.builder.relationship_type(rel_type);

        let relationship = {
            let reconciler = self.reconciler.lock();
            let lookup = |end: &NodeRef| {
                reconciler.resolve(end).cloned().ok_or_else(|| {
                    CoreError::InvalidIntent(format!("node {} is not on the diagram", end))
                })
            };
            let (source, target) = (lookup(&source)?, lookup(&target)?);
            reconciler.factory().create_relationship(
                &rel_type,
                Some(&DataPacket::Object(properties)),
                &source,
                &target,
            )
        };

        let relationship = match relationship.key() {
            Some(_) => relationship,
            None => {
                let staged = self.reconciler.lock().stage_relationship(relationship)?;
                match staged {
                    Some(ready) => ready,
                    None => return Ok(BegunEvent::Done(EventOutcome::Staged)),
                }
            }
        };

        let intent = self
            .builder
            .build(Intent::CreateRelationship { relationship }, context)?;
        let ticket = self.executor.submit(&intent)?;
        Ok(BegunEvent::Commit(PendingCommit {
            intent,
            ticket,
            follow_up: FollowUp::None,
        }))
    }

    /// Asynchronous half: await the commit, merge under the current mode context, render.
    #[instrument(skip(self, pending), fields(key = %pending.intent.key, kind = %pending.intent.kind))]
    pub async fn finish(&self, pending: PendingCommit) -> Result<EventOutcome, CoreError> {
        let PendingCommit {
            intent,
            ticket,
            follow_up,
        } = pending;

        let rows = match ticket.wait().await {
            Ok(rows) => rows,
            Err(e) => return Err(self.recover(&intent, e)),
        };

        let merged = {
            let current = self.modes.lock().context();
            self.reconciler.lock().merge(&rows, &intent, current)
        };
        let outcome = match merged {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.recover(&intent, e)),
        };

        let hint = match follow_up {
            FollowUp::CenterOn(id) => Some(RenderHint::CenterOn(NodeRef::Real(id))),
            FollowUp::PlaceCreated(at) => outcome.promoted.map(|id| RenderHint::PlaceAt {
                node: NodeRef::Real(id),
                at,
            }),
            FollowUp::None | FollowUp::PresentNode(_) => None,
        };
        if !outcome.diff.is_empty() || hint.is_some() {
            self.renderer.apply(&outcome.diff, hint);
        }

        let presented = match follow_up {
            FollowUp::PresentNode(id) => Some(id),
            FollowUp::PlaceCreated(_) => outcome.promoted,
            _ => None,
        };
        if let Some(id) = presented {
            let node = self.reconciler.lock().node(id).cloned();
            match node {
                Some(node) => self.forms.present_node(&node),
                None => debug!(id = %id, "Nothing to present, node not in model"),
            }
        }

        let mut diff = outcome.diff;
        for relationship in outcome.released {
            let drawn = format!(
                "{} from {} to {}",
                relationship.rel_type, relationship.source, relationship.target
            );
            match self.commit_released(relationship).await {
                Ok(released) => diff.extend(released),
                Err(e) => {
                    warn!(relationship = %drawn, error = %e, "Staged relationship could not be committed, discarding it");
                    self.renderer.notify(&Notice::new(
                        NoticeLevel::Warning,
                        format!("Relationship {} was discarded: {}", drawn, e),
                    ));
                }
            }
        }

        Ok(EventOutcome::Merged(diff))
    }

    /// Commits a staged relationship whose endpoints have just been persisted.
    ///
    /// Boxed because it re-enters `finish`.
    fn commit_released(&self, relationship: Relationship) -> BoxFuture<'_, Result<Diff, CoreError>> {
        async move {
            info!(
                rel_type = %relationship.rel_type,
                source = %relationship.source,
                target = %relationship.target,
                "Committing released relationship"
            );
            let begun = self
                .submit(Intent::CreateRelationship { relationship }, FollowUp::None)
                .map_err(|e| {
                    self.report(&e);
                    e
                })?;
            match begun {
                BegunEvent::Commit(pending) => match self.finish(pending).await? {
                    EventOutcome::Merged(diff) => Ok(diff),
                    _ => Ok(Diff::default()),
                },
                BegunEvent::Done(_) => Ok(Diff::default()),
            }
        }
        .boxed()
    }

    /// Undoes optimistic state for a failed intent and tells the user if it matters.
    fn recover(&self, intent: &TransactionIntent, error: CoreError) -> CoreError {
        match &error {
            CoreError::StaleResultDiscarded { .. } => {
                debug!(key = %intent.key, "Result arrived after a mode change")
            }
            _ => warn!(key = %intent.key, error = %error, "Intent failed"),
        }
        self.roll_back(intent);
        self.report(&error);
        error
    }

    fn roll_back(&self, intent: &TransactionIntent) {
        let diff = self.reconciler.lock().rollback(intent);
        if !diff.is_empty() {
            self.renderer.apply(&diff, None);
        }
    }

    fn report(&self, error: &CoreError) {
        if error.is_user_visible() {
            self.renderer.notify(&Notice::from_error(error));
        }
    }
}
