use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::component::{Component, ComponentId, ComponentRef, ComponentStore, ErasedStore};
use crate::entity::{Entity, EntityAllocator, WorldId};
use crate::error::EcsError;
use crate::query::{Query, QueryData, QueryFilter};
use crate::signature::QuerySignature;

/// The central ECS container. Owns all entities and component stores.
pub struct World {
    pub(crate) entities: EntityAllocator,
    pub(crate) components: HashMap<TypeId, Box<dyn ErasedStore>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(WorldId::next()),
            components: HashMap::new(),
        }
    }

    pub fn id(&self) -> WorldId {
        self.entities.world()
    }

    // ---- Entity management ----

    /// Spawn a new entity with no components.
    pub fn spawn(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Spawn an entity and attach every component of `bundle`.
    pub fn spawn_with<B: Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.spawn();
        bundle.insert_into(self, entity);
        entity
    }

    /// Whether `entity` was spawned by this world.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Number of spawned entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ---- Component management ----

    fn store_entry<T: Component>(&mut self) -> &mut ComponentStore<T> {
        self.components
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!("Created component store for {}", std::any::type_name::<T>());
                Box::new(ComponentStore::<T>::new())
            })
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()
            .expect("component store registered under the wrong type")
    }

    /// The store for `T`, if any entity has ever received a `T`.
    pub fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<ComponentStore<T>>())
    }

    pub(crate) fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<ComponentStore<T>>())
    }

    pub(crate) fn erased_store(&self, id: &ComponentId) -> Option<&dyn ErasedStore> {
        self.components.get(&id.type_id()).map(|s| &**s)
    }

    /// Component types that have a store, in no particular order.
    pub fn component_types(&self) -> Vec<ComponentId> {
        self.components.values().map(|s| s.component()).collect()
    }

    /// Insert a component on an entity. Replaces any existing component of the same type.
    ///
    /// # Panics
    /// Panics if `entity` was not spawned by this world.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, component: T) {
        assert!(
            self.entities.contains(entity),
            "entity {entity:?} was not spawned by this world"
        );
        self.store_entry::<T>().insert(entity, component);
    }

    /// Read a component on an entity.
    ///
    /// # Panics
    /// Panics if a live query holds mutable access to `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<ComponentRef<'_, T>> {
        self.store::<T>()?.get(entity)
    }

    /// Read a component on an entity, returning `AlreadyBorrowed` while a
    /// live query holds mutable access to `T`.
    pub fn try_get<T: Component>(&self, entity: Entity) -> Result<Option<ComponentRef<'_, T>>, EcsError> {
        match self.store::<T>() {
            Some(store) => store.try_get(entity),
            None => Ok(None),
        }
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.store_mut::<T>()?.get_mut(entity)
    }

    /// Check whether an entity has a component of the given type.
    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.store::<T>().is_some_and(|s| s.contains(entity))
    }

    // ---- Queries ----

    /// Query entities that have every component in `D`.
    ///
    /// # Example
    /// ```ignore
    /// let mut query = world.query::<(&mut Position, &Velocity)>()?;
    /// for (entity, (pos, vel)) in query.iter_mut() {
    ///     // ...
    /// }
    /// ```
    pub fn query<D: QueryData>(&self) -> Result<Query<'_, D>, EcsError> {
        self.query_filtered::<D, ()>()
    }

    /// Query entities that have every component in `D` and pass the filter `F`.
    pub fn query_filtered<D: QueryData, F: QueryFilter>(
        &self,
    ) -> Result<Query<'_, D, F>, EcsError> {
        let signature = QuerySignature::of::<D, F>();
        signature.validate()?;
        Query::new(self, signature)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of components inserted together by [`World::spawn_with`].
pub trait Bundle {
    fn insert_into(self, world: &mut World, entity: Entity);
}

macro_rules! impl_bundle_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn insert_into(self, world: &mut World, entity: Entity) {
                let ($($name,)+) = self;
                $(world.insert_component(entity, $name);)+
            }
        }
    };
}

impl_bundle_tuple!(A);
impl_bundle_tuple!(A, B);
impl_bundle_tuple!(A, B, C);
impl_bundle_tuple!(A, B, C, D);
impl_bundle_tuple!(A, B, C, D, E);
impl_bundle_tuple!(A, B, C, D, E, F);
impl_bundle_tuple!(A, B, C, D, E, F, G);
impl_bundle_tuple!(A, B, C, D, E, F, G, H);
