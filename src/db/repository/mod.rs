//! Repository layer: entity-scoped database operations.
//!
//! Free functions over `&Connection`, one sub-module per aggregate.

mod entity;
mod field_change;
mod link;

pub use entity::*;
pub use field_change::*;
pub use link::*;
