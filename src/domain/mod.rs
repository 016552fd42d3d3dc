//! Domain model: aggregates, value objects, events and pricing rules.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod records;
pub mod value_objects;
