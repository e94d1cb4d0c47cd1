use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use rawsy_core::{Aggregate, AggregateId};
use rawsy_events::EventEnvelope;

use super::Projection;
use crate::read_model::DocumentStore;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Read model whose documents are the rehydrated aggregates themselves.
///
/// Each committed event is applied onto the stored document with
/// `Aggregate::apply`, so readers see exactly the state the next command
/// will be decided against. Removed aggregates are dropped from the store.
#[derive(Debug)]
pub struct DocumentProjection<A, S> {
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    name: String,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, S> DocumentProjection<A, S>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned,
    S: DocumentStore<AggregateId, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            name: format!("{}.documents", A::AGGREGATE_TYPE),
            _aggregate: PhantomData,
        }
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<A> {
        self.store.get(&aggregate_id)
    }

    pub fn list(&self) -> Vec<A> {
        self.store.list()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(aggregate_id);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Already applied (at-least-once delivery).
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let mut document = self
            .store
            .get(&aggregate_id)
            .unwrap_or_else(|| A::empty(aggregate_id));
        document.apply(&event);

        if document.is_removed() {
            self.store.remove(&aggregate_id);
        } else {
            self.store.upsert(aggregate_id, document);
        }

        self.update_cursor(aggregate_id, seq);
        debug!(
            projection = %self.name,
            %aggregate_id,
            sequence_number = seq,
            event_type = envelope.event_type(),
            "projection applied event"
        );
        Ok(())
    }

    /// Drop every document and replay `envelopes` in stream order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.aggregate_type() == A::AGGREGATE_TYPE)
            .collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

impl<A, S> Projection for DocumentProjection<A, S>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned,
    S: DocumentStore<AggregateId, A>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        DocumentProjection::apply_envelope(self, envelope)
    }

    fn rebuild(&self, envelopes: &[EventEnvelope<JsonValue>]) -> Result<(), ProjectionError> {
        self.rebuild_from_scratch(envelopes.iter().cloned())
    }
}
