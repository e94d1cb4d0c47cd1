//! Products domain module (event-sourced).
//!
//! Business rules for the marketplace catalog: supplier-owned product
//! documents, admin moderation (review, flag, unflag) and supplier discounts.
//! Pure deterministic domain logic (no IO, no HTTP, no storage).

pub mod catalog;
pub mod discount;
pub mod moderation;
pub mod product;
pub mod query;

pub use catalog::{CatalogDetails, CatalogPatch, NewCatalogDetails, Price};
pub use discount::{Discount, Percentage, discounted_price};
pub use moderation::{FlagRecord, FlagState, ModerationStatus, Rating, ReviewDecision};
pub use product::{
    ApplyDiscount, AttachImage, CreateProduct, DeleteProduct, DetachImage, DiscountApplied,
    DiscountRemoved, FlagProduct, ImageAttached, ImageDetached, Product, ProductCommand,
    ProductCreated, ProductDeleted, ProductEvent, ProductFlagged, ProductId, ProductReviewed,
    ProductUnflagged, ProductUpdated, RemoveDiscount, ReviewProduct, UnflagProduct, UpdateProduct,
};
pub use query::{CatalogStats, SearchFilter};
