//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values
/// (`Percentage(20.0) == Percentage(20.0)`), unlike entities which carry an
/// identity. Constructors are where validation lives: a value object that
/// exists is a valid one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Price(u64);
///
/// impl ValueObject for Price {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
