//! Kestrel ECS - Entity Component System
//!
//! A small ECS runtime for the Kestrel engine.
//! Entities are world-tagged indices, components live in one sparse-set store
//! per type, and systems run once per tick against the queries they declare.

mod app;
mod component;
mod entity;
mod error;
mod query;
mod schedule;
mod signature;
mod system;
mod world;

pub use app::App;
pub use component::{Component, ComponentId, ComponentRef, ComponentStore};
pub use entity::{Entity, EntityAllocator, WorldId};
pub use error::{EcsError, SystemFailure, TickError};
pub use query::{
    Query, QueryData, QueryFilter, QueryIter, ReadFetch, ReadOnlyQueryData, With, Without,
    WriteFetch,
};
pub use schedule::{Schedule, ScheduleState, SystemId};
pub use signature::{Access, QuerySignature, SystemAccess};
pub use system::{FnSystem, QuerySystem, System, SystemBuilder, SystemContext};
pub use world::{Bundle, World};
