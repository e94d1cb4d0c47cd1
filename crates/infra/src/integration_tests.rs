//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → inline projection → EventBus → subscriber

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;

use rawsy_core::{Actor, AggregateRoot, UserId};
use rawsy_events::{EventBus, EventEnvelope, InMemoryEventBus};
use rawsy_products::{
    ApplyDiscount, CreateProduct, DeleteProduct, FlagProduct, ModerationStatus, NewCatalogDetails,
    Product, ProductCommand, ProductId, ReviewProduct,
};
use rawsy_support::{CreateFaq, DeleteFaq, Faq, FaqCommand, FaqId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{
    DocumentProjection, FaqProjection, ProductCatalogProjection, Projection, ProjectionError,
};
use crate::read_model::InMemoryDocumentStore;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

struct Harness {
    dispatcher: Arc<Dispatcher>,
    catalog: Arc<ProductCatalogProjection>,
    faqs: Arc<FaqProjection>,
    bus: Bus,
    store: Arc<InMemoryEventStore>,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let catalog: Arc<ProductCatalogProjection> =
        Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new())));
    let faqs: Arc<FaqProjection> = Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new())));
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone())
        .with_projection(catalog.clone())
        .with_projection(faqs.clone());

    Harness {
        dispatcher: Arc::new(dispatcher),
        catalog,
        faqs,
        bus,
        store,
    }
}

fn create_product(h: &Harness, owner: Actor, price: i64) -> ProductId {
    let product_id = ProductId::generate();
    h.dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: owner,
                details: NewCatalogDetails {
                    name: "Kraft paper rolls".to_string(),
                    description: None,
                    category: "packaging".to_string(),
                    price,
                    unit: "roll".to_string(),
                    stock: 12,
                    negotiable: false,
                },
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    product_id
}

fn create_faq(h: &Harness, admin: Actor) -> FaqId {
    let faq_id = FaqId::generate();
    h.dispatcher
        .dispatch::<Faq>(
            faq_id.aggregate_id(),
            FaqCommand::CreateFaq(CreateFaq {
                faq_id,
                actor: admin,
                question: "Who approves listings?".to_string(),
                answer: "Marketplace admins.".to_string(),
                tags: vec![],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    faq_id
}

fn flag_command(product_id: ProductId, by: Actor, reason: &str) -> ProductCommand {
    ProductCommand::FlagProduct(FlagProduct {
        product_id,
        actor: by,
        reason: reason.to_string(),
        occurred_at: Utc::now(),
    })
}

#[test]
fn command_updates_read_model_before_returning() {
    let h = setup();
    let owner = Actor::supplier(UserId::new());
    let product_id = create_product(&h, owner, 1000);

    let doc = h.catalog.get(product_id.aggregate_id()).unwrap();
    assert_eq!(doc.status(), ModerationStatus::Pending);
    assert_eq!(doc.supplier(), Some(owner.id));
    assert_eq!(doc.version(), 1);

    h.dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            ProductCommand::ApplyDiscount(ApplyDiscount {
                product_id,
                actor: owner,
                percentage: 25.0,
                expires_at: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    let doc = h.catalog.get(product_id.aggregate_id()).unwrap();
    assert_eq!(doc.final_price(Utc::now()), 750);
}

#[test]
fn rejected_command_appends_nothing() {
    let h = setup();
    let owner = Actor::supplier(UserId::new());
    let product_id = create_product(&h, owner, 1000);

    let err = h
        .dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            ProductCommand::ReviewProduct(ReviewProduct {
                product_id,
                actor: Actor::admin(UserId::new()),
                decision: "rejected".to_string(),
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidArgument(_)));
    assert_eq!(h.store.load_stream(product_id.aggregate_id()).unwrap().len(), 1);
}

#[test]
fn unknown_product_maps_to_not_found() {
    let h = setup();
    let product_id = ProductId::generate();
    let err = h
        .dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            flag_command(product_id, Actor::admin(UserId::new()), "spam"),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

#[test]
fn concurrent_flags_are_never_lost() {
    let h = setup();
    let product_id = create_product(&h, Actor::supplier(UserId::new()), 1000);
    let n = 16;

    let workers: Vec<_> = (0..n)
        .map(|i| {
            let dispatcher = h.dispatcher.clone();
            thread::spawn(move || {
                dispatcher.dispatch::<Product>(
                    product_id.aggregate_id(),
                    flag_command(product_id, Actor::admin(UserId::new()), &format!("report {i}")),
                )
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap().unwrap();
    }

    let doc = h.catalog.get(product_id.aggregate_id()).unwrap();
    assert_eq!(doc.flag_count(), n as u64);
    assert_eq!(doc.flags().history().len(), n);
    assert!(doc.flagged());

    let replayed: Product = h.dispatcher.load(product_id.aggregate_id()).unwrap();
    assert_eq!(replayed, doc);
}

#[test]
fn delete_removes_document_and_blocks_later_commands() {
    let h = setup();
    let owner = Actor::supplier(UserId::new());
    let product_id = create_product(&h, owner, 1000);

    h.dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            ProductCommand::DeleteProduct(DeleteProduct {
                product_id,
                actor: owner,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    assert!(h.catalog.get(product_id.aggregate_id()).is_none());
    let err = h
        .dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            flag_command(product_id, Actor::admin(UserId::new()), "spam"),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

#[test]
fn committed_events_reach_bus_subscribers() {
    let h = setup();
    let sub = h.bus.subscribe();
    let product_id = create_product(&h, Actor::supplier(UserId::new()), 500);

    let env = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(env.aggregate_id(), product_id.aggregate_id());
    assert_eq!(env.event_type(), "products.product.created");
    assert_eq!(env.sequence_number(), 1);
}

#[test]
fn projections_rebuild_from_the_event_log() {
    let h = setup();
    let admin = Actor::admin(UserId::new());
    let product_id = create_product(&h, Actor::supplier(UserId::new()), 500);
    h.dispatcher
        .dispatch::<Product>(product_id.aggregate_id(), flag_command(product_id, admin, "spam"))
        .unwrap();

    create_faq(&h, admin);

    let before = h.catalog.get(product_id.aggregate_id()).unwrap();
    let replayed = h.dispatcher.rebuild_projections().unwrap();

    assert_eq!(replayed, 3);
    assert_eq!(h.catalog.get(product_id.aggregate_id()).unwrap(), before);
    assert_eq!(h.faqs.list().len(), 1);
}

#[test]
fn commands_against_another_aggregate_type_are_not_found() {
    let h = setup();
    let admin = Actor::admin(UserId::new());
    let product_id = create_product(&h, Actor::supplier(UserId::new()), 500);
    let faq_id = create_faq(&h, admin);

    let as_faq = FaqId::new(product_id.aggregate_id());
    let err = h
        .dispatcher
        .dispatch::<Faq>(
            as_faq.aggregate_id(),
            FaqCommand::DeleteFaq(DeleteFaq {
                faq_id: as_faq,
                actor: admin,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
    assert!(matches!(
        h.dispatcher.load::<Faq>(product_id.aggregate_id()),
        Err(DispatchError::NotFound)
    ));

    let as_product = ProductId::new(faq_id.aggregate_id());
    let err = h
        .dispatcher
        .dispatch::<Product>(as_product.aggregate_id(), flag_command(as_product, admin, "spam"))
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));

    // Both streams are untouched and still usable by their own type.
    assert_eq!(h.store.load_stream(product_id.aggregate_id()).unwrap().len(), 1);
    assert_eq!(h.store.load_stream(faq_id.aggregate_id()).unwrap().len(), 1);
    assert!(h.catalog.get(product_id.aggregate_id()).is_some());
    assert_eq!(h.faqs.list().len(), 1);
}

#[test]
fn stream_locks_are_released_after_each_command() {
    let h = setup();
    let admin = Actor::admin(UserId::new());

    for _ in 0..1000 {
        let product_id = ProductId::generate();
        let err = h
            .dispatcher
            .dispatch::<Product>(product_id.aggregate_id(), flag_command(product_id, admin, "spam"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }
    assert_eq!(h.dispatcher.tracked_streams(), 0);

    let product_id = create_product(&h, Actor::supplier(UserId::new()), 500);
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = h.dispatcher.clone();
            thread::spawn(move || {
                dispatcher.dispatch::<Product>(product_id.aggregate_id(), flag_command(product_id, admin, "spam"))
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap().unwrap();
    }
    assert_eq!(h.dispatcher.tracked_streams(), 0);
    assert_eq!(h.catalog.get(product_id.aggregate_id()).unwrap().flag_count(), 8);
}

/// Fails its first inline apply, then behaves.
#[derive(Default)]
struct FlakyProjection {
    failed: AtomicBool,
    rebuilds: AtomicUsize,
}

impl Projection for FlakyProjection {
    fn name(&self) -> &str {
        "flaky"
    }

    fn apply_envelope(&self, _envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.failed.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProjectionError::Deserialize("read model offline".to_string()))
        }
    }

    fn rebuild(&self, _envelopes: &[EventEnvelope<JsonValue>]) -> Result<(), ProjectionError> {
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn projection_failure_after_append_is_repaired_by_rebuild() {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let flaky = Arc::new(FlakyProjection::default());
    let catalog: Arc<ProductCatalogProjection> =
        Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new())));
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone())
        .with_projection(flaky.clone())
        .with_projection(catalog.clone());
    let h = Harness {
        dispatcher: Arc::new(dispatcher),
        catalog,
        faqs: Arc::new(DocumentProjection::new(Arc::new(InMemoryDocumentStore::new()))),
        bus,
        store,
    };
    let sub = h.bus.subscribe();

    // The flaky projection runs first, so the catalog only sees the event via rebuild.
    let product_id = create_product(&h, Actor::supplier(UserId::new()), 500);

    assert_eq!(flaky.rebuilds.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.load_stream(product_id.aggregate_id()).unwrap().len(), 1);
    assert_eq!(h.catalog.get(product_id.aggregate_id()).unwrap().version(), 1);
    let env = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(env.aggregate_id(), product_id.aggregate_id());

    // Later commands project inline again.
    h.dispatcher
        .dispatch::<Product>(
            product_id.aggregate_id(),
            flag_command(product_id, Actor::admin(UserId::new()), "spam"),
        )
        .unwrap();
    assert_eq!(flaky.rebuilds.load(Ordering::SeqCst), 1);
    assert_eq!(h.catalog.get(product_id.aggregate_id()).unwrap().flag_count(), 1);
}
