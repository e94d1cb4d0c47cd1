//! Projections: read models built from committed events.
//!
//! All projections are:
//! - **Rebuildable**: reconstructed from `EventStore::load_all`
//! - **Idempotent**: replays of already-applied sequence numbers are ignored

pub mod document;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use rawsy_core::AggregateId;
use rawsy_events::EventEnvelope;
use rawsy_products::Product;
use rawsy_support::Faq;

use crate::read_model::InMemoryDocumentStore;

pub use document::{DocumentProjection, ProjectionError};

/// Consumer of committed envelopes, run inline by the dispatcher.
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Discard current state and replay `envelopes`.
    fn rebuild(&self, envelopes: &[EventEnvelope<JsonValue>]) -> Result<(), ProjectionError>;
}

impl<P> Projection for Arc<P>
where
    P: Projection + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        (**self).apply_envelope(envelope)
    }

    fn rebuild(&self, envelopes: &[EventEnvelope<JsonValue>]) -> Result<(), ProjectionError> {
        (**self).rebuild(envelopes)
    }
}

/// Product documents keyed by aggregate id.
pub type ProductCatalogProjection =
    DocumentProjection<Product, Arc<InMemoryDocumentStore<AggregateId, Product>>>;

/// FAQ documents keyed by aggregate id.
pub type FaqProjection = DocumentProjection<Faq, Arc<InMemoryDocumentStore<AggregateId, Faq>>>;
