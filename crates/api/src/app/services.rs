//! Service wiring: event store, bus, inline projections, dispatcher and the
//! realtime fan-out used by the SSE endpoint.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tokio::sync::broadcast;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use rawsy_core::{Aggregate, AggregateId, DomainError, UserId};
use rawsy_events::{EventEnvelope, InMemoryEventBus};
use rawsy_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{DocumentProjection, FaqProjection, ProductCatalogProjection},
    read_model::InMemoryDocumentStore,
    workers::{BusWorker, WorkerHandle},
};
use rawsy_products::{Product, ProductId};
use rawsy_support::{Faq, FaqId};

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

/// Message pushed to every connected realtime client.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: JsonValue,
}

impl RealtimeMessage {
    /// Compact notification for a committed domain event.
    pub fn from_envelope(envelope: &EventEnvelope<JsonValue>) -> Self {
        Self {
            topic: envelope.event_type().to_string(),
            payload: json!({
                "aggregateType": envelope.aggregate_type(),
                "aggregateId": envelope.aggregate_id().to_string(),
                "sequenceNumber": envelope.sequence_number(),
                "occurredAt": envelope.occurred_at(),
            }),
        }
    }

    pub fn broadcast(title: &str, message: &str, from: UserId, sent_at: DateTime<Utc>) -> Self {
        Self {
            topic: "support.broadcast".to_string(),
            payload: json!({
                "title": title,
                "message": message,
                "from": from.to_string(),
                "sentAt": sent_at,
            }),
        }
    }
}

pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    catalog: Arc<ProductCatalogProjection>,
    faqs: Arc<FaqProjection>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    // Forwards committed events into `realtime_tx`; exits when the bus is dropped.
    _forwarder: WorkerHandle,
}

pub fn build_services(realtime_capacity: usize) -> std::io::Result<AppServices> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let catalog: Arc<ProductCatalogProjection> =
        Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new())));
    let faqs: Arc<FaqProjection> = Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new())));

    let dispatcher = CommandDispatcher::new(store, bus.clone())
        .with_projection(catalog.clone())
        .with_projection(faqs.clone());

    let (realtime_tx, _) = broadcast::channel(realtime_capacity);
    let tx = realtime_tx.clone();
    let forwarder = BusWorker::spawn("realtime-forwarder", &bus, move |envelope: EventEnvelope<JsonValue>| {
        // No receivers is not a failure; realtime delivery is lossy.
        let _ = tx.send(RealtimeMessage::from_envelope(&envelope));
        Ok::<(), Infallible>(())
    })?;

    Ok(AppServices {
        dispatcher: Arc::new(dispatcher),
        catalog,
        faqs,
        realtime_tx,
        _forwarder: forwarder,
    })
}

impl AppServices {
    pub fn dispatch<A>(&self, aggregate_id: AggregateId, command: A::Command) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: rawsy_events::Event + Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher.dispatch::<A>(aggregate_id, command)
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.catalog.get(id.aggregate_id())
    }

    pub fn products(&self) -> Vec<Product> {
        self.catalog.list()
    }

    pub fn faq(&self, id: FaqId) -> Option<Faq> {
        self.faqs.get(id.aggregate_id())
    }

    /// FAQ entries in creation order.
    pub fn faqs(&self) -> Vec<Faq> {
        let mut all = self.faqs.list();
        all.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id_typed().aggregate_id().cmp(&b.id_typed().aggregate_id()))
        });
        all
    }

    /// Push a message to every connected realtime client; returns how many received it.
    pub fn broadcast(&self, message: RealtimeMessage) -> usize {
        self.realtime_tx.send(message).unwrap_or(0)
    }

    pub fn subscribe_realtime(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.realtime_tx.subscribe()
    }
}

/// SSE stream over the realtime channel. Lagged messages are dropped.
pub fn realtime_sse_stream(
    services: &AppServices,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let rx = services.subscribe_realtime();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let msg = msg.ok()?;
        let event = SseEvent::default().event(msg.topic.clone()).json_data(&msg).ok()?;
        Some(Ok(event))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
