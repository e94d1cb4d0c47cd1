//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓  (per-stream lock held from here)
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append to store (optimistic `ExpectedVersion` check)
//!   ↓
//! 5. Apply inline projections (read-after-write)
//!   ↓  (lock released)
//! 6. Publish envelopes to the bus (best-effort)
//! ```
//!
//! Commands against the same stream are serialized, so read-modify-write
//! sequences such as repeated flagging never lose an update. The optimistic
//! check on append still guards against writers that bypass the dispatcher.
//! Lock entries only live while a command on that stream is in flight.
//!
//! Once step 4 succeeds the command has happened. A failing inline projection
//! is repaired by rebuilding the read models from the log; the command only
//! fails if that rebuild fails too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use rawsy_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use rawsy_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::projections::{Projection, ProjectionError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Optimistic concurrency failure or duplicate create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Historical payloads no longer match the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Conflict(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Forbidden(msg) => DispatchError::Forbidden(msg),
            DomainError::InvalidArgument(msg) => DispatchError::InvalidArgument(msg),
            DomainError::InvalidId(msg) => DispatchError::InvalidId(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - `S`: event store (`InMemoryEventStore` in tests/dev)
/// - `B`: event bus receiving committed envelopes after the lock is released
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    projections: Vec<Arc<dyn Projection>>,
    stream_locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl<S, B> core::fmt::Debug for CommandDispatcher<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field(
                "projections",
                &self.projections.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            projections: Vec::new(),
            stream_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a projection applied inline after every successful append.
    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    fn stream_lock(&self, aggregate_id: AggregateId) -> Result<StreamLease<'_>, DispatchError> {
        let mut locks = self
            .stream_locks
            .lock()
            .map_err(|_| EventStoreError::Unavailable("stream lock table poisoned".to_string()))?;
        let lock = locks.entry(aggregate_id).or_default().clone();
        Ok(StreamLease {
            table: &self.stream_locks,
            aggregate_id,
            lock,
        })
    }

    /// Streams with a command currently in flight.
    #[cfg(test)]
    pub(crate) fn tracked_streams(&self) -> usize {
        self.stream_locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Claim on a per-stream lock; the table entry is dropped with the last claim.
struct StreamLease<'a> {
    table: &'a Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
    aggregate_id: AggregateId,
    lock: Arc<Mutex<()>>,
}

impl StreamLease<'_> {
    fn acquire(&self) -> Result<std::sync::MutexGuard<'_, ()>, DispatchError> {
        self.lock
            .lock()
            .map_err(|_| EventStoreError::Unavailable("stream lock poisoned".to_string()).into())
    }
}

impl Drop for StreamLease<'_> {
    fn drop(&mut self) {
        // Claims are only cloned under the table lock, so a count of 2 (table +
        // this lease) means nobody else is waiting on the stream.
        if let Ok(mut locks) = self.table.lock() {
            let idle = locks
                .get(&self.aggregate_id)
                .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
            if idle {
                locks.remove(&self.aggregate_id);
            }
        }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate stream `aggregate_id`.
    ///
    /// Returns the committed events. A domain rejection appends nothing; an
    /// empty decision is a no-op.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: rawsy_events::Event + Serialize + DeserializeOwned,
    {
        let lease = self.stream_lock(aggregate_id)?;
        let (committed, projection_failure) = {
            let _guard = lease.acquire()?;

            // 1) Load history
            let history = self.store.load_stream(aggregate_id)?;
            validate_loaded_stream(aggregate_id, &history)?;
            ensure_stream_type::<A>(&history)?;
            let expected = ExpectedVersion::Exact(stream_version(&history));

            // 2) Rehydrate aggregate
            let mut aggregate = A::empty(aggregate_id);
            apply_history::<A>(&mut aggregate, &history)?;

            // 3) Decide events (no mutation)
            let decided = aggregate.handle(&command)?;
            if decided.is_empty() {
                return Ok(vec![]);
            }

            // 4) Persist (append-only, optimistic)
            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()?;
            let committed = self.store.append(uncommitted, expected)?;

            // 5) Inline projections
            let projection_failure = self.project(&committed).err();
            (committed, projection_failure)
        };
        drop(lease);

        info!(
            aggregate_type = A::AGGREGATE_TYPE,
            %aggregate_id,
            events = committed.len(),
            version = stream_version(&committed),
            "command committed"
        );

        // 6) Publish (events are durable; publication is best-effort)
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_type = %stored.event_type,
                    %aggregate_id,
                    error = ?err,
                    "event publication failed"
                );
            }
        }

        if let Some(err) = projection_failure {
            error!(
                aggregate_type = A::AGGREGATE_TYPE,
                %aggregate_id,
                error = %err,
                "inline projection failed after append; rebuilding read models"
            );
            self.rebuild_projections()?;
        }

        Ok(committed)
    }

    fn project(&self, committed: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in committed {
            let envelope = stored.to_envelope();
            for projection in &self.projections {
                projection.apply_envelope(&envelope)?;
            }
        }
        Ok(())
    }

    /// Rehydrate an aggregate from its stream without dispatching anything.
    #[cfg(test)]
    pub(crate) fn load<A>(&self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        ensure_stream_type::<A>(&history)?;
        let mut aggregate = A::empty(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Rebuild the registered projections from the full event log.
    pub fn rebuild_projections(&self) -> Result<usize, DispatchError> {
        let all = self.store.load_all()?;
        let envelopes: Vec<_> = all.iter().map(StoredEvent::to_envelope).collect();
        for projection in &self.projections {
            projection.rebuild(&envelopes)?;
        }
        info!(events = envelopes.len(), projections = self.projections.len(), "projections rebuilt");
        Ok(envelopes.len())
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    // Backends must return one stream, strictly increasing from 1.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

/// A stream owned by another aggregate type is unknown to `A`.
fn ensure_stream_type<A: Aggregate>(stream: &[StoredEvent]) -> Result<(), DispatchError> {
    match stream.first() {
        Some(first) if first.aggregate_type != A::AGGREGATE_TYPE => Err(DispatchError::NotFound),
        _ => Ok(()),
    }
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
