use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::Entity;
use crate::error::EcsError;

/// Marker trait for types that can be stored as ECS components.
pub trait Component: 'static + Send + Sync {}

/// Blanket implementation: any `'static + Send + Sync` type is a valid component.
impl<T: 'static + Send + Sync> Component for T {}

/// Stable identity of a component type. Compares by `TypeId`; the name is kept
/// for error messages and logs.
#[derive(Clone, Copy)]
pub struct ComponentId {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentId {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentId {}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Shared borrow of a single component value.
pub type ComponentRef<'a, T> = MappedRwLockReadGuard<'a, T>;

/// Type-erased view of a component store. Presence checks go through here so
/// filters never need to know the concrete component type.
pub(crate) trait ErasedStore: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn component(&self) -> ComponentId;
    fn contains(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn entities(&self) -> &[Entity];
}

/// Sparse-set storage for a single component type.
///
/// The index (`sparse` + `entities`) only changes through `&mut self`, so it
/// can be read freely while queries are live. The dense values sit behind a
/// lock that query handles take for their whole lifetime.
pub struct ComponentStore<T> {
    /// Maps entity index → dense slot. `None` means the entity has no component.
    sparse: Vec<Option<u32>>,
    /// Owner of each dense slot, in insertion order.
    entities: Vec<Entity>,
    /// Packed component values.
    values: RwLock<Vec<T>>,
}

impl<T: Component> ComponentStore<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            values: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace the component for the given entity.
    ///
    /// # Panics
    /// Panics if the entity's slot index is already owned by an entity from
    /// another world.
    pub fn insert(&mut self, entity: Entity, value: T) {
        let idx = entity.index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        let values = self.values.get_mut();
        if let Some(slot) = self.sparse[idx] {
            assert!(
                self.entities[slot as usize] == entity,
                "entity {entity:?} was not spawned by this world"
            );
            values[slot as usize] = value;
        } else {
            let slot = u32::try_from(values.len())
                .unwrap_or_else(|_| panic!("component store slot space exhausted"));
            self.sparse[idx] = Some(slot);
            values.push(value);
            self.entities.push(entity);
        }
    }

    /// Dense slot of `entity`, if it has this component.
    pub(crate) fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = (*self.sparse.get(entity.index as usize)?)? as usize;
        (self.entities[slot] == entity).then_some(slot)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    /// Read the component of `entity`.
    ///
    /// # Panics
    /// Panics if a live query holds mutable access to this component type.
    pub fn get(&self, entity: Entity) -> Option<ComponentRef<'_, T>> {
        self.try_get(entity).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Read the component of `entity`, reporting a live mutable query
    /// instead of panicking.
    pub fn try_get(&self, entity: Entity) -> Result<Option<ComponentRef<'_, T>>, EcsError> {
        let Some(slot) = self.slot(entity) else {
            return Ok(None);
        };
        let values = self.read()?;
        Ok(Some(RwLockReadGuard::map(values, |v| &v[slot])))
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = self.slot(entity)?;
        self.values.get_mut().get_mut(slot)
    }

    /// Iterate over all `(entity, &mut component)` pairs in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities
            .iter()
            .copied()
            .zip(self.values.get_mut().iter_mut())
    }

    /// Entities that have this component, in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>, EcsError> {
        self.values.try_read().ok_or(EcsError::AlreadyBorrowed {
            component: std::any::type_name::<T>(),
        })
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>, EcsError> {
        self.values.try_write().ok_or(EcsError::AlreadyBorrowed {
            component: std::any::type_name::<T>(),
        })
    }
}

impl<T: Component> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn component(&self) -> ComponentId {
        ComponentId::of::<T>()
    }

    fn contains(&self, entity: Entity) -> bool {
        ComponentStore::contains(self, entity)
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    fn entities(&self) -> &[Entity] {
        ComponentStore::entities(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityAllocator, WorldId};

    fn entities(n: usize) -> Vec<Entity> {
        let mut alloc = EntityAllocator::new(WorldId::next());
        (0..n).map(|_| alloc.allocate()).collect()
    }

    #[test]
    fn insert_and_get() {
        let e = entities(6);
        let mut store = ComponentStore::new();
        store.insert(e[5], 42i32);
        assert_eq!(store.get(e[5]).as_deref(), Some(&42));
        assert!(store.get(e[0]).is_none());
        assert!(store.contains(e[5]));
        assert!(!store.contains(e[0]));
    }

    #[test]
    fn overwrite() {
        let e = entities(1);
        let mut store = ComponentStore::new();
        store.insert(e[0], 1i32);
        store.insert(e[0], 2);
        assert_eq!(store.get(e[0]).as_deref(), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn foreign_entity_with_same_index_is_absent() {
        let ours = entities(1);
        let theirs = entities(1);
        let mut store = ComponentStore::new();
        store.insert(ours[0], 'a');
        assert_eq!(ours[0].index(), theirs[0].index());
        assert!(!store.contains(theirs[0]));
        assert!(store.get(theirs[0]).is_none());
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let e = entities(3);
        let mut store = ComponentStore::new();
        store.insert(e[2], 200i32);
        store.insert(e[0], 0);
        for (_, value) in store.iter_mut() {
            *value += 1;
        }
        assert_eq!(store.entities(), &[e[2], e[0]]);
        assert_eq!(store.get(e[2]).as_deref(), Some(&201));
        assert_eq!(store.get_mut(e[0]), Some(&mut 1));
    }

    #[test]
    fn write_lock_blocks_other_access() {
        let e = entities(1);
        let mut store = ComponentStore::new();
        store.insert(e[0], 7u8);
        let guard = store.write().unwrap();
        assert!(matches!(store.read(), Err(EcsError::AlreadyBorrowed { .. })));
        drop(guard);
        assert!(store.read().is_ok());
    }

    #[test]
    #[should_panic(expected = "was not spawned by this world")]
    fn foreign_entity_cannot_take_over_slot() {
        let ours = entities(1);
        let theirs = entities(1);
        let mut store = ComponentStore::new();
        store.insert(ours[0], 'a');
        store.insert(theirs[0], 'b');
    }

    #[test]
    fn try_get_reports_live_writer() {
        let e = entities(2);
        let mut store = ComponentStore::new();
        store.insert(e[0], 3u16);
        let guard = store.write().unwrap();
        assert!(matches!(store.try_get(e[0]), Err(EcsError::AlreadyBorrowed { .. })));
        assert!(matches!(store.try_get(e[1]), Ok(None)));
        drop(guard);
        assert_eq!(store.try_get(e[0]).unwrap().as_deref(), Some(&3));
    }

    #[test]
    fn component_id_compares_by_type() {
        assert_eq!(ComponentId::of::<u32>(), ComponentId::of::<u32>());
        assert_ne!(ComponentId::of::<u32>(), ComponentId::of::<i32>());
        assert_eq!(ComponentId::of::<u32>().name(), "u32");
    }
}
