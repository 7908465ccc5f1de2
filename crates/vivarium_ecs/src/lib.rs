//! # vivarium_ecs
//!
//! The runtime of the vivarium ECS kernel — typed component storage, the
//! update-cycle engine, and deferred-consistency entity filters.
//!
//! This crate provides:
//!
//! - [`EntityStore`] — per-kind partitioned component storage, one
//!   authoritative store per run.
//! - [`Engine`] — owns the store and drives the synchronization point every
//!   filter refreshes at.
//! - [`EntityFilter`] — a standing query over a required/optional component
//!   schema with a cached, epoch-synchronized result set.
//! - [`ComponentGroup`] / [`ComponentRef`] — per-entity snapshot groups of
//!   shared component handles.
//!
//! ## Consistency model
//!
//! Mutations apply to the store immediately but filters only observe them at
//! the next [`Engine::update`] (or at attachment). Between updates a filter's
//! result set is frozen: reads are idempotent, and a batch of mutations is
//! always observed whole. The execution model is single-threaded and
//! synchronous throughout.

pub mod engine;
pub mod filter;
pub mod store;

pub use engine::Engine;
pub use filter::{ComponentGroup, EntityFilter, EntityMap};
pub use store::{ComponentRef, EntityStore};
