//! # vivarium_component
//!
//! The primitives of the vivarium ECS kernel — what an entity is, what a
//! component is, and how a filter declares the component kinds it matches.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — monotonically increasing ID allocator.
//! - [`Component`] trait — the contract all ECS data must satisfy.
//! - [`ComponentTypeId`] — stable per-kind type identifier.
//! - [`FilterSchema`] — declarative required/optional slot list for filters.
//!
//! Nothing in this crate owns component data; storage and the update cycle
//! live in `vivarium_ecs`.

pub mod component;
pub mod entity;
pub mod schema;

pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use schema::{FilterSchema, SchemaError, SlotKind, SlotSpec};
