use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rawsy_core::error::require_text;
use rawsy_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use rawsy_events::Event;

use crate::catalog::{CatalogDetails, CatalogPatch, NewCatalogDetails};
use crate::discount::{Discount, Percentage};
use crate::moderation::{FlagRecord, FlagState, ModerationStatus, Rating, ReviewDecision};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Aggregate root: Product.
///
/// The rehydrated state is the product document served to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    id: ProductId,
    supplier: Option<UserId>,
    details: CatalogDetails,
    discount: Discount,
    image: Option<String>,
    images: Vec<String>,
    status: ModerationStatus,
    rejection_reason: Option<String>,
    rating: Rating,
    flags: FlagState,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            supplier: None,
            details: CatalogDetails::blank(),
            discount: Discount::default(),
            image: None,
            images: Vec::new(),
            status: ModerationStatus::Pending,
            rejection_reason: None,
            rating: Rating::default(),
            flags: FlagState::default(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn supplier(&self) -> Option<UserId> {
        self.supplier
    }

    pub fn details(&self) -> &CatalogDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn description(&self) -> Option<&str> {
        self.details.description.as_deref()
    }

    pub fn category(&self) -> &str {
        &self.details.category
    }

    pub fn price(&self) -> u64 {
        self.details.price.amount()
    }

    pub fn discount(&self) -> &Discount {
        &self.discount
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn status(&self) -> ModerationStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn flags(&self) -> &FlagState {
        &self.flags
    }

    pub fn flagged(&self) -> bool {
        self.flags.flagged()
    }

    pub fn flag_count(&self) -> u64 {
        self.flags.flag_count()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    /// Visible on public listings.
    pub fn is_public(&self) -> bool {
        self.exists() && self.status == ModerationStatus::Approved
    }

    pub fn final_price(&self, now: DateTime<Utc>) -> u64 {
        self.discount.final_price(self.price(), now)
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.supplier == Some(user)
    }

    #[cfg(test)]
    pub(crate) fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = rating;
        self
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct (supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub details: NewCatalogDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (owning supplier, partial).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub patch: CatalogPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProduct (owning supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviewProduct (admin). `decision` is the raw client value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub decision: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FlagProduct (admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UnflagProduct (admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnflagProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyDiscount (owning supplier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyDiscount {
    pub product_id: ProductId,
    pub actor: Actor,
    pub percentage: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveDiscount (owning supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDiscount {
    pub product_id: ProductId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachImage (owning supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachImage {
    pub product_id: ProductId,
    pub actor: Actor,
    pub url: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DetachImage (owning supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachImage {
    pub product_id: ProductId,
    pub actor: Actor,
    pub url: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    DeleteProduct(DeleteProduct),
    ReviewProduct(ReviewProduct),
    FlagProduct(FlagProduct),
    UnflagProduct(UnflagProduct),
    ApplyDiscount(ApplyDiscount),
    RemoveDiscount(RemoveDiscount),
    AttachImage(AttachImage),
    DetachImage(DetachImage),
}

impl ProductCommand {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductCommand::CreateProduct(c) => c.product_id,
            ProductCommand::UpdateProduct(c) => c.product_id,
            ProductCommand::DeleteProduct(c) => c.product_id,
            ProductCommand::ReviewProduct(c) => c.product_id,
            ProductCommand::FlagProduct(c) => c.product_id,
            ProductCommand::UnflagProduct(c) => c.product_id,
            ProductCommand::ApplyDiscount(c) => c.product_id,
            ProductCommand::RemoveDiscount(c) => c.product_id,
            ProductCommand::AttachImage(c) => c.product_id,
            ProductCommand::DetachImage(c) => c.product_id,
        }
    }
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub supplier: UserId,
    pub details: CatalogDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated. Carries the resolved catalog fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub details: CatalogDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted. Lists the image references released with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub images: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductReviewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReviewed {
    pub product_id: ProductId,
    pub reviewer: UserId,
    pub decision: ReviewDecision,
    pub rejection_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductFlagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFlagged {
    pub product_id: ProductId,
    pub flag: FlagRecord,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUnflagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUnflagged {
    pub product_id: ProductId,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountApplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountApplied {
    pub product_id: ProductId,
    pub percentage: Percentage,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRemoved {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ImageAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttached {
    pub product_id: ProductId,
    pub url: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ImageDetached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetached {
    pub product_id: ProductId,
    pub url: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductDeleted(ProductDeleted),
    ProductReviewed(ProductReviewed),
    ProductFlagged(ProductFlagged),
    ProductUnflagged(ProductUnflagged),
    DiscountApplied(DiscountApplied),
    DiscountRemoved(DiscountRemoved),
    ImageAttached(ImageAttached),
    ImageDetached(ImageDetached),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::ProductDeleted(_) => "products.product.deleted",
            ProductEvent::ProductReviewed(_) => "products.product.reviewed",
            ProductEvent::ProductFlagged(_) => "products.product.flagged",
            ProductEvent::ProductUnflagged(_) => "products.product.unflagged",
            ProductEvent::DiscountApplied(_) => "products.product.discount_applied",
            ProductEvent::DiscountRemoved(_) => "products.product.discount_removed",
            ProductEvent::ImageAttached(_) => "products.product.image_attached",
            ProductEvent::ImageDetached(_) => "products.product.image_detached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
            ProductEvent::ProductReviewed(e) => e.occurred_at,
            ProductEvent::ProductFlagged(e) => e.occurred_at,
            ProductEvent::ProductUnflagged(e) => e.occurred_at,
            ProductEvent::DiscountApplied(e) => e.occurred_at,
            ProductEvent::DiscountRemoved(e) => e.occurred_at,
            ProductEvent::ImageAttached(e) => e.occurred_at,
            ProductEvent::ImageDetached(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "products.product";

    fn empty(id: AggregateId) -> Self {
        Product::empty(ProductId::new(id))
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.supplier = Some(e.supplier);
                self.details = e.details.clone();
                self.status = ModerationStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = e.details.clone();
            }
            ProductEvent::ProductDeleted(_) => {
                self.deleted = true;
                self.image = None;
                self.images.clear();
            }
            ProductEvent::ProductReviewed(e) => {
                self.status = e.decision.status();
                self.rejection_reason = e.rejection_reason.clone();
            }
            ProductEvent::ProductFlagged(e) => {
                self.flags.record(e.flag.clone());
            }
            ProductEvent::ProductUnflagged(_) => {
                self.flags.clear();
            }
            ProductEvent::DiscountApplied(e) => {
                self.discount = Discount {
                    percentage: e.percentage,
                    active: true,
                    expires_at: e.expires_at,
                };
            }
            ProductEvent::DiscountRemoved(_) => {
                self.discount.active = false;
            }
            ProductEvent::ImageAttached(e) => {
                if self.image.is_none() {
                    self.image = Some(e.url.clone());
                }
                self.images.push(e.url.clone());
            }
            ProductEvent::ImageDetached(e) => {
                self.images.retain(|u| u != &e.url);
                if self.image.as_deref() == Some(e.url.as_str()) {
                    self.image = self.images.first().cloned();
                }
            }
        }

        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::DeleteProduct(cmd) => self.handle_delete(cmd),
            ProductCommand::ReviewProduct(cmd) => self.handle_review(cmd),
            ProductCommand::FlagProduct(cmd) => self.handle_flag(cmd),
            ProductCommand::UnflagProduct(cmd) => self.handle_unflag(cmd),
            ProductCommand::ApplyDiscount(cmd) => self.handle_apply_discount(cmd),
            ProductCommand::RemoveDiscount(cmd) => self.handle_remove_discount(cmd),
            ProductCommand::AttachImage(cmd) => self.handle_attach_image(cmd),
            ProductCommand::DetachImage(cmd) => self.handle_detach_image(cmd),
        }
    }

    fn is_removed(&self) -> bool {
        self.deleted
    }
}

impl Product {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    /// NotFound, then Forbidden (role/ownership).
    fn ensure_owner_access(&self, product_id: ProductId, actor: &Actor) -> Result<(), DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(product_id)?;
        match self.supplier {
            Some(owner) => actor.ensure_owner(owner),
            None => Err(DomainError::invariant("product has no supplier")),
        }
    }

    /// NotFound, then Forbidden (admin capability).
    fn ensure_admin_access(&self, product_id: ProductId, actor: &Actor) -> Result<(), DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(product_id)?;
        actor.ensure_admin()
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        cmd.actor.ensure_supplier()?;
        let details = cmd.details.validate()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            supplier: cmd.actor.id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        if cmd.patch.is_empty() {
            return Err(DomainError::invalid_argument(
                "update must change at least one field",
            ));
        }
        let details = cmd.patch.apply_to(&self.details)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            product_id: cmd.product_id,
            images: self.images.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_review(&self, cmd: &ReviewProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_admin_access(cmd.product_id, &cmd.actor)?;

        let decision: ReviewDecision = cmd.decision.parse()?;
        let rejection_reason = match decision {
            ReviewDecision::Approved => None,
            ReviewDecision::Rejected => Some(require_text(
                "rejection reason",
                cmd.reason.as_deref().unwrap_or_default(),
            )?),
        };

        Ok(vec![ProductEvent::ProductReviewed(ProductReviewed {
            product_id: cmd.product_id,
            reviewer: cmd.actor.id,
            decision,
            rejection_reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_flag(&self, cmd: &FlagProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_admin_access(cmd.product_id, &cmd.actor)?;

        let reason = require_text("flag reason", &cmd.reason)?;

        Ok(vec![ProductEvent::ProductFlagged(ProductFlagged {
            product_id: cmd.product_id,
            flag: FlagRecord {
                reason,
                date: cmd.occurred_at,
                user: cmd.actor.id,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unflag(&self, cmd: &UnflagProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_admin_access(cmd.product_id, &cmd.actor)?;

        Ok(vec![ProductEvent::ProductUnflagged(ProductUnflagged {
            product_id: cmd.product_id,
            by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_discount(&self, cmd: &ApplyDiscount) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        let percentage = Percentage::new(cmd.percentage)?;
        if !percentage.is_positive() {
            return Err(DomainError::invalid_argument(
                "a discount of 0% cannot be applied; use removeDiscount to clear a discount",
            ));
        }
        if let Some(expires_at) = cmd.expires_at {
            if expires_at <= cmd.occurred_at {
                return Err(DomainError::invalid_argument(
                    "expiresAt must be in the future",
                ));
            }
        }

        Ok(vec![ProductEvent::DiscountApplied(DiscountApplied {
            product_id: cmd.product_id,
            percentage,
            expires_at: cmd.expires_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_discount(&self, cmd: &RemoveDiscount) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        Ok(vec![ProductEvent::DiscountRemoved(DiscountRemoved {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_image(&self, cmd: &AttachImage) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        let url = require_text("image url", &cmd.url)?;
        if self.images.contains(&url) {
            return Err(DomainError::invalid_argument("image already attached"));
        }

        Ok(vec![ProductEvent::ImageAttached(ImageAttached {
            product_id: cmd.product_id,
            url,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_detach_image(&self, cmd: &DetachImage) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_owner_access(cmd.product_id, &cmd.actor)?;

        let url = cmd.url.trim();
        if !self.images.iter().any(|u| u == url) {
            return Err(DomainError::not_found());
        }

        Ok(vec![ProductEvent::ImageDetached(ImageDetached {
            product_id: cmd.product_id,
            url: url.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rawsy_core::Role;

    fn test_product_id() -> ProductId {
        ProductId::generate()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn supplier() -> Actor {
        Actor::supplier(UserId::new())
    }

    fn admin() -> Actor {
        Actor::admin(UserId::new())
    }

    fn yarn(price: i64) -> NewCatalogDetails {
        NewCatalogDetails {
            name: "Cotton yarn".to_string(),
            description: Some("Combed, 30s count".to_string()),
            category: "textiles".to_string(),
            price,
            unit: "kg".to_string(),
            stock: 50,
            negotiable: false,
        }
    }

    /// Handle then apply, like the dispatcher does.
    fn exec(product: &mut Product, command: ProductCommand) -> Result<Vec<ProductEvent>, DomainError> {
        let events = product.handle(&command)?;
        for event in &events {
            product.apply(event);
        }
        Ok(events)
    }

    fn created_product(owner: &Actor, price: i64) -> Product {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        exec(
            &mut product,
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: *owner,
                details: yarn(price),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        product
    }

    fn flag(product: &mut Product, by: &Actor, reason: &str) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::FlagProduct(FlagProduct {
                product_id: product.id_typed(),
                actor: *by,
                reason: reason.to_string(),
                occurred_at: test_time(),
            }),
        )
    }

    fn review(product: &mut Product, by: &Actor, decision: &str, reason: Option<&str>) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::ReviewProduct(ReviewProduct {
                product_id: product.id_typed(),
                actor: *by,
                decision: decision.to_string(),
                reason: reason.map(str::to_string),
                occurred_at: test_time(),
            }),
        )
    }

    fn apply_discount(product: &mut Product, by: &Actor, pct: f64, expires_at: Option<DateTime<Utc>>) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::ApplyDiscount(ApplyDiscount {
                product_id: product.id_typed(),
                actor: *by,
                percentage: pct,
                expires_at,
                occurred_at: test_time(),
            }),
        )
    }

    fn remove_discount(product: &mut Product, by: &Actor) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::RemoveDiscount(RemoveDiscount {
                product_id: product.id_typed(),
                actor: *by,
                occurred_at: test_time(),
            }),
        )
    }

    fn attach(product: &mut Product, by: &Actor, url: &str) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::AttachImage(AttachImage {
                product_id: product.id_typed(),
                actor: *by,
                url: url.to_string(),
                occurred_at: test_time(),
            }),
        )
    }

    fn detach(product: &mut Product, by: &Actor, url: &str) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::DetachImage(DetachImage {
                product_id: product.id_typed(),
                actor: *by,
                url: url.to_string(),
                occurred_at: test_time(),
            }),
        )
    }

    fn delete(product: &mut Product, by: &Actor) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::DeleteProduct(DeleteProduct {
                product_id: product.id_typed(),
                actor: *by,
                occurred_at: test_time(),
            }),
        )
    }

    fn update(product: &mut Product, by: &Actor, patch: CatalogPatch) -> Result<Vec<ProductEvent>, DomainError> {
        exec(
            product,
            ProductCommand::UpdateProduct(UpdateProduct {
                product_id: product.id_typed(),
                actor: *by,
                patch,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_product_stamps_supplier_and_starts_pending() {
        let owner = supplier();
        let product = created_product(&owner, 1200);

        assert_eq!(product.supplier(), Some(owner.id));
        assert_eq!(product.status(), ModerationStatus::Pending);
        assert_eq!(product.rejection_reason(), None);
        assert_eq!(product.discount(), &Discount::default());
        assert_eq!(product.rating(), Rating::default());
        assert_eq!(product.flag_count(), 0);
        assert!(!product.flagged());
        assert!(!product.is_public());
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn create_product_requires_supplier_role() {
        for actor in [admin(), Actor::new(UserId::new(), Role::Manufacturer)] {
            let product_id = test_product_id();
            let product = Product::empty(product_id);
            let err = product
                .handle(&ProductCommand::CreateProduct(CreateProduct {
                    product_id,
                    actor,
                    details: yarn(100),
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Forbidden(_)));
        }
    }

    #[test]
    fn create_product_rejects_invalid_fields() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut details = yarn(100);
        details.name = "   ".to_string();

        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: supplier(),
                details,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let owner = supplier();
        let product = created_product(&owner, 100);
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: product.id_typed(),
                actor: owner,
                details: yarn(100),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn commands_on_unknown_product_fail_not_found() {
        let mut product = Product::empty(test_product_id());
        let err = flag(&mut product, &admin(), "spam").unwrap_err();
        assert_eq!(err, DomainError::NotFound);
        let err = remove_discount(&mut product, &supplier()).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn two_flags_accumulate_history() {
        let mut product = created_product(&supplier(), 100);
        let (u1, u2) = (admin(), admin());

        flag(&mut product, &u1, "spam").unwrap();
        flag(&mut product, &u2, "scam").unwrap();

        assert!(product.flagged());
        assert_eq!(product.flag_count(), 2);
        assert_eq!(product.flags().history().len(), 2);
        assert_eq!(product.flags().flagged_by(), Some(u2.id));
        assert_eq!(product.flags().flag_reason(), Some("scam"));
        assert_eq!(product.flags().history()[0].user, u1.id);
    }

    #[test]
    fn flag_requires_admin_and_reason() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);

        let err = flag(&mut product, &owner, "spam").unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = flag(&mut product, &admin(), "  ").unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert_eq!(product.flag_count(), 0);
    }

    #[test]
    fn unflag_resets_only_the_visibility_toggle() {
        let mut product = created_product(&supplier(), 100);
        let moderator = admin();
        flag(&mut product, &moderator, "spam").unwrap();

        let product_id = product.id_typed();
        exec(
            &mut product,
            ProductCommand::UnflagProduct(UnflagProduct {
                product_id,
                actor: moderator,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert!(!product.flagged());
        assert_eq!(product.flag_count(), 1);
        assert_eq!(product.flags().history().len(), 1);
    }

    #[test]
    fn review_rejected_requires_reason() {
        let mut product = created_product(&supplier(), 100);
        let moderator = admin();

        let err = review(&mut product, &moderator, "rejected", Some("")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        let err = review(&mut product, &moderator, "rejected", None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));

        review(&mut product, &moderator, "rejected", Some("blurry photos")).unwrap();
        assert_eq!(product.status(), ModerationStatus::Rejected);
        assert_eq!(product.rejection_reason(), Some("blurry photos"));
    }

    #[test]
    fn approval_clears_rejection_reason_and_publishes() {
        let mut product = created_product(&supplier(), 100);
        let moderator = admin();
        review(&mut product, &moderator, "rejected", Some("missing unit")).unwrap();
        review(&mut product, &moderator, "approved", None).unwrap();

        assert_eq!(product.status(), ModerationStatus::Approved);
        assert_eq!(product.rejection_reason(), None);
        assert!(product.is_public());
    }

    #[test]
    fn review_rejects_unknown_decision_and_non_admins() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);

        let err = review(&mut product, &admin(), "pending", None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        let err = review(&mut product, &owner, "approved", None).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[test]
    fn discount_then_removal_keeps_percentage() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);

        apply_discount(&mut product, &owner, 20.0, None).unwrap();
        assert_eq!(product.final_price(test_time()), 80);

        remove_discount(&mut product, &owner).unwrap();
        assert_eq!(product.final_price(test_time()), 100);
        assert!(!product.discount().active);
        assert_eq!(product.discount().percentage.value(), 20.0);
    }

    #[test]
    fn discount_validation() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);

        for pct in [-1.0, 100.5, f64::INFINITY, 0.0] {
            let err = apply_discount(&mut product, &owner, pct, None).unwrap_err();
            assert!(matches!(err, DomainError::InvalidArgument(_)), "pct {pct}");
        }
        let past = test_time() - Duration::days(1);
        let err = apply_discount(&mut product, &owner, 10.0, Some(past)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert_eq!(product.discount(), &Discount::default());
    }

    #[test]
    fn zero_discount_points_to_remove_discount() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        apply_discount(&mut product, &owner, 20.0, None).unwrap();

        let err = apply_discount(&mut product, &owner, 0.0, None).unwrap_err();
        match err {
            DomainError::InvalidArgument(msg) => assert!(msg.contains("removeDiscount"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(product.discount().active);
        assert_eq!(product.final_price(test_time()), 80);
    }

    #[test]
    fn other_supplier_is_forbidden_on_owner_operations() {
        let owner = supplier();
        let intruder = supplier();
        let mut product = created_product(&owner, 100);

        let patch = CatalogPatch {
            price: Some(50),
            ..CatalogPatch::default()
        };
        let results = [
            update(&mut product, &intruder, patch),
            delete(&mut product, &intruder),
            apply_discount(&mut product, &intruder, 10.0, None),
            remove_discount(&mut product, &intruder),
            attach(&mut product, &intruder, "https://cdn/x.png"),
        ];
        for result in results {
            assert!(matches!(result, Err(DomainError::Forbidden(_))));
        }
        // Admin capability does not imply ownership.
        assert!(matches!(delete(&mut product, &admin()), Err(DomainError::Forbidden(_))));
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn ownership_check_precedes_field_validation() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        let err = apply_discount(&mut product, &supplier(), 500.0, None).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[test]
    fn update_is_partial_and_keeps_status() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        review(&mut product, &admin(), "approved", None).unwrap();

        update(
            &mut product,
            &owner,
            CatalogPatch {
                price: Some(250),
                stock: Some(7),
                ..CatalogPatch::default()
            },
        )
        .unwrap();

        assert_eq!(product.price(), 250);
        assert_eq!(product.details().stock, 7);
        assert_eq!(product.name(), "Cotton yarn");
        assert_eq!(product.status(), ModerationStatus::Approved);

        let err = update(&mut product, &owner, CatalogPatch::default()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn delete_removes_document_and_later_operations_fail_not_found() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        attach(&mut product, &owner, "https://cdn/a.png").unwrap();

        let events = delete(&mut product, &owner).unwrap();
        match &events[0] {
            ProductEvent::ProductDeleted(e) => assert_eq!(e.images, vec!["https://cdn/a.png".to_string()]),
            other => panic!("Expected ProductDeleted event, got {other:?}"),
        }

        assert!(product.is_removed());
        assert!(product.images().is_empty());
        assert_eq!(delete(&mut product, &owner).unwrap_err(), DomainError::NotFound);
        assert_eq!(flag(&mut product, &admin(), "spam").unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn images_track_primary() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);

        attach(&mut product, &owner, "a.png").unwrap();
        attach(&mut product, &owner, "b.png").unwrap();
        assert_eq!(product.image(), Some("a.png"));
        assert!(matches!(
            attach(&mut product, &owner, "a.png"),
            Err(DomainError::InvalidArgument(_))
        ));

        detach(&mut product, &owner, "a.png").unwrap();
        assert_eq!(product.image(), Some("b.png"));
        assert_eq!(product.images(), ["b.png".to_string()]);

        assert_eq!(detach(&mut product, &owner, "zzz.png").unwrap_err(), DomainError::NotFound);
        detach(&mut product, &owner, "b.png").unwrap();
        assert_eq!(product.image(), None);
    }

    #[test]
    fn rating_is_never_touched() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        review(&mut product, &admin(), "approved", None).unwrap();
        apply_discount(&mut product, &owner, 5.0, None).unwrap();
        flag(&mut product, &admin(), "odd listing").unwrap();
        assert_eq!(product.rating(), Rating::default());
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let owner = supplier();
        let product = created_product(&owner, 100);
        let before = product.clone();

        let _ = product.handle(&ProductCommand::FlagProduct(FlagProduct {
            product_id: product.id_typed(),
            actor: admin(),
            reason: "spam".to_string(),
            occurred_at: test_time(),
        }));

        assert_eq!(product, before);
    }

    #[test]
    fn events_serialize_with_stable_types() {
        let owner = supplier();
        let mut product = created_product(&owner, 100);
        let events = apply_discount(&mut product, &owner, 12.5, None).unwrap();
        assert_eq!(events[0].event_type(), "products.product.discount_applied");

        let json = serde_json::to_value(&events[0]).unwrap();
        let back: ProductEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, events[0]);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Flag(String),
            Unflag,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                3 => "[a-z]{1,12}".prop_map(Step::Flag),
                1 => Just(Step::Unflag),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: flagCount == len(flags); flagged == (count > 0) without unflag.
            #[test]
            fn flag_count_tracks_history(reasons in prop::collection::vec("[a-z]{1,12}", 0..20)) {
                let mut product = created_product(&supplier(), 100);
                let moderator = admin();
                for reason in &reasons {
                    flag(&mut product, &moderator, reason).unwrap();
                    prop_assert_eq!(product.flag_count() as usize, product.flags().history().len());
                }
                prop_assert_eq!(product.flag_count() as usize, reasons.len());
                prop_assert_eq!(product.flagged(), !reasons.is_empty());
            }

            /// Property: unflag never changes count or history.
            #[test]
            fn unflag_preserves_history(steps in prop::collection::vec(step(), 0..30)) {
                let mut product = created_product(&supplier(), 100);
                let moderator = admin();
                let mut expected = 0usize;
                for s in steps {
                    match s {
                        Step::Flag(reason) => {
                            flag(&mut product, &moderator, &reason).unwrap();
                            expected += 1;
                            prop_assert!(product.flagged());
                        }
                        Step::Unflag => {
                            let product_id = product.id_typed();
                            exec(&mut product, ProductCommand::UnflagProduct(UnflagProduct {
                                product_id,
                                actor: moderator,
                                occurred_at: test_time(),
                            })).unwrap();
                            prop_assert!(!product.flagged());
                        }
                    }
                    prop_assert_eq!(product.flag_count() as usize, expected);
                    prop_assert_eq!(product.flags().history().len(), expected);
                }
            }

            /// Property: active, non-expired discount yields price*(100-p)/100.
            #[test]
            fn final_price_formula(units in 1u64..10_000, pct in 1u32..=100) {
                let owner = supplier();
                let price = units * 100;
                let mut product = created_product(&owner, price as i64);
                apply_discount(&mut product, &owner, pct as f64, None).unwrap();
                let now = test_time();
                prop_assert_eq!(product.final_price(now), units * (100 - pct as u64));

                remove_discount(&mut product, &owner).unwrap();
                prop_assert_eq!(product.final_price(now), price);
            }

            /// Property: the discounted price never exceeds the list price.
            #[test]
            fn final_price_is_bounded(price in 1i64..1_000_000_000, pct in 0.01f64..=100.0) {
                let owner = supplier();
                let mut product = created_product(&owner, price);
                apply_discount(&mut product, &owner, pct, None).unwrap();
                prop_assert!(product.final_price(test_time()) <= price as u64);
            }

            /// Property: handle is deterministic and leaves state untouched.
            #[test]
            fn handle_is_deterministic(reason in "[A-Za-z][A-Za-z0-9 ]{0,40}") {
                let product = created_product(&supplier(), 100);
                let before = product.clone();
                let cmd = ProductCommand::FlagProduct(FlagProduct {
                    product_id: product.id_typed(),
                    actor: admin(),
                    reason,
                    occurred_at: test_time(),
                });

                let events1 = product.handle(&cmd);
                let events2 = product.handle(&cmd);

                prop_assert_eq!(&product, &before);
                prop_assert_eq!(events1, events2);
            }

            /// Property: replaying the same events yields the same state.
            #[test]
            fn apply_is_deterministic(name in "[A-Za-z][A-Za-z0-9 ]{0,40}", price in 1i64..100_000) {
                let owner = supplier();
                let product_id = test_product_id();
                let mut details = yarn(price);
                details.name = name;
                let at = test_time();

                let events = vec![
                    ProductEvent::ProductCreated(ProductCreated {
                        product_id,
                        supplier: owner.id,
                        details: details.validate().unwrap(),
                        occurred_at: at,
                    }),
                    ProductEvent::DiscountApplied(DiscountApplied {
                        product_id,
                        percentage: Percentage::new(15.0).unwrap(),
                        expires_at: None,
                        occurred_at: at,
                    }),
                    ProductEvent::ImageAttached(ImageAttached {
                        product_id,
                        url: "a.png".to_string(),
                        occurred_at: at,
                    }),
                ];

                let mut first = Product::empty(product_id);
                let mut second = Product::empty(product_id);
                for e in &events {
                    first.apply(e);
                    second.apply(e);
                }

                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.version(), events.len() as u64);
            }
        }
    }
}
