//! `rawsy-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the acting principal, the domain error taxonomy and the
//! aggregate/value-object traits the business crates build on.

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use actor::{Actor, Role};
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use value_object::ValueObject;
