use std::marker::PhantomData;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::component::{Component, ComponentId, ComponentStore, ErasedStore};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::signature::{Access, QuerySignature};
use crate::world::World;

/// Trait implemented for query data types (`&T`, `&mut T`, and tuples of them).
///
/// # Safety
/// `signature` must report every component the fetch borrows, with `Write`
/// for every exclusive borrow. `init_fetch` must take the matching store
/// lock, and `fetch` must only hand out references into values guarded by it.
pub unsafe trait QueryData {
    /// The borrowed value produced for one entity.
    type Item<'q>;
    /// Locks and pointers held for the lifetime of a query handle.
    type Fetch<'w>;

    fn signature(signature: &mut QuerySignature);

    /// Lock the stores this data reads or writes. `Ok(None)` means a store
    /// does not exist yet, so nothing can match.
    fn init_fetch(world: &World) -> Result<Option<Self::Fetch<'_>>, EcsError>;

    /// Fetch the item for one entity.
    ///
    /// # Safety
    /// While any returned item is alive, the caller must not fetch the same
    /// entity again from the same `Fetch`.
    unsafe fn fetch<'q, 'w>(fetch: &'q Self::Fetch<'w>, entity: Entity) -> Option<Self::Item<'q>>;
}

/// Query data that never borrows anything exclusively.
///
/// # Safety
/// Only implement for data whose `fetch` hands out shared references.
pub unsafe trait ReadOnlyQueryData: QueryData {}

/// Fetch state for `&T`.
pub struct ReadFetch<'w, T> {
    store: &'w ComponentStore<T>,
    values: RwLockReadGuard<'w, Vec<T>>,
}

/// Fetch state for `&mut T`. The pointer stays valid while the guard is held.
pub struct WriteFetch<'w, T> {
    store: &'w ComponentStore<T>,
    values: *mut T,
    _guard: RwLockWriteGuard<'w, Vec<T>>,
}

unsafe impl<T: Component> QueryData for &T {
    type Item<'q> = &'q T;
    type Fetch<'w> = ReadFetch<'w, T>;

    fn signature(signature: &mut QuerySignature) {
        signature.add_required(ComponentId::of::<T>(), Access::Read);
    }

    fn init_fetch(world: &World) -> Result<Option<Self::Fetch<'_>>, EcsError> {
        let Some(store) = world.store::<T>() else {
            return Ok(None);
        };
        Ok(Some(ReadFetch {
            store,
            values: store.read()?,
        }))
    }

    unsafe fn fetch<'q, 'w>(fetch: &'q Self::Fetch<'w>, entity: Entity) -> Option<Self::Item<'q>> {
        let slot = fetch.store.slot(entity)?;
        fetch.values.get(slot)
    }
}

unsafe impl<T: Component> ReadOnlyQueryData for &T {}

unsafe impl<T: Component> QueryData for &mut T {
    type Item<'q> = &'q mut T;
    type Fetch<'w> = WriteFetch<'w, T>;

    fn signature(signature: &mut QuerySignature) {
        signature.add_required(ComponentId::of::<T>(), Access::Write);
    }

    fn init_fetch(world: &World) -> Result<Option<Self::Fetch<'_>>, EcsError> {
        let Some(store) = world.store::<T>() else {
            return Ok(None);
        };
        let mut guard = store.write()?;
        Ok(Some(WriteFetch {
            store,
            values: guard.as_mut_ptr(),
            _guard: guard,
        }))
    }

    unsafe fn fetch<'q, 'w>(fetch: &'q Self::Fetch<'w>, entity: Entity) -> Option<Self::Item<'q>> {
        let slot = fetch.store.slot(entity)?;
        // SAFETY: the write guard gives this fetch exclusive access to the
        // values, `slot` is in bounds because the index and values only change
        // together under `&mut`, and the caller never fetches one entity twice
        // while an item is alive.
        Some(unsafe { &mut *fetch.values.add(slot) })
    }
}

macro_rules! impl_query_data_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        unsafe impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'q> = ($($name::Item<'q>,)+);
            type Fetch<'w> = ($($name::Fetch<'w>,)+);

            fn signature(signature: &mut QuerySignature) {
                $($name::signature(signature);)+
            }

            fn init_fetch(world: &World) -> Result<Option<Self::Fetch<'_>>, EcsError> {
                Ok(Some(($(
                    match $name::init_fetch(world)? {
                        Some(fetch) => fetch,
                        None => return Ok(None),
                    },
                )+)))
            }

            unsafe fn fetch<'q, 'w>(
                fetch: &'q Self::Fetch<'w>,
                entity: Entity,
            ) -> Option<Self::Item<'q>> {
                let ($($name,)+) = fetch;
                Some(($(unsafe { $name::fetch($name, entity)? },)+))
            }
        }

        unsafe impl<$($name: ReadOnlyQueryData),+> ReadOnlyQueryData for ($($name,)+) {}
    };
}

impl_query_data_tuple!(A);
impl_query_data_tuple!(A, B);
impl_query_data_tuple!(A, B, C);
impl_query_data_tuple!(A, B, C, D);
impl_query_data_tuple!(A, B, C, D, E);
impl_query_data_tuple!(A, B, C, D, E, F);
impl_query_data_tuple!(A, B, C, D, E, F, G);
impl_query_data_tuple!(A, B, C, D, E, F, G, H);

/// Trait implemented for query filters (`With<T>`, `Without<T>`, and tuples).
pub trait QueryFilter {
    fn signature(signature: &mut QuerySignature);
}

/// Require `T` without borrowing it.
pub struct With<T>(PhantomData<T>);

/// Exclude entities that have `T`.
pub struct Without<T>(PhantomData<T>);

impl QueryFilter for () {
    fn signature(_signature: &mut QuerySignature) {}
}

impl<T: Component> QueryFilter for With<T> {
    fn signature(signature: &mut QuerySignature) {
        signature.add_required(ComponentId::of::<T>(), Access::Presence);
    }
}

impl<T: Component> QueryFilter for Without<T> {
    fn signature(signature: &mut QuerySignature) {
        signature.add_excluded(ComponentId::of::<T>());
    }
}

macro_rules! impl_query_filter_tuple {
    ($($name:ident),+) => {
        impl<$($name: QueryFilter),+> QueryFilter for ($($name,)+) {
            fn signature(signature: &mut QuerySignature) {
                $($name::signature(signature);)+
            }
        }
    };
}

impl_query_filter_tuple!(A);
impl_query_filter_tuple!(A, B);
impl_query_filter_tuple!(A, B, C);
impl_query_filter_tuple!(A, B, C, D);
impl_query_filter_tuple!(A, B, C, D, E);
impl_query_filter_tuple!(A, B, C, D, E, F);
impl_query_filter_tuple!(A, B, C, D, E, F, G);
impl_query_filter_tuple!(A, B, C, D, E, F, G, H);

/// A live query handle. Holds the store locks of its data until dropped.
///
/// Matching is recomputed on every iteration: the smallest required store
/// drives, every candidate is checked against the other required stores and
/// the excluded ones.
pub struct Query<'w, D: QueryData, F: QueryFilter = ()> {
    signature: QuerySignature,
    /// `None` when a required store does not exist; the query matches nothing.
    fetch: Option<D::Fetch<'w>>,
    required: Vec<&'w dyn ErasedStore>,
    excluded: Vec<&'w dyn ErasedStore>,
    _filter: PhantomData<fn() -> F>,
}

impl<'w, D: QueryData, F: QueryFilter> Query<'w, D, F> {
    /// Build a handle for an already-validated signature.
    pub(crate) fn new(world: &'w World, signature: QuerySignature) -> Result<Self, EcsError> {
        let required: Vec<_> = signature
            .required()
            .iter()
            .filter_map(|(id, _)| world.erased_store(id))
            .collect();
        let excluded = signature
            .excluded()
            .iter()
            .filter_map(|id| world.erased_store(id))
            .collect();

        let fetch = if required.len() == signature.required().len() {
            D::init_fetch(world)?
        } else {
            None
        };

        Ok(Self {
            signature,
            fetch,
            required,
            excluded,
            _filter: PhantomData,
        })
    }

    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }

    fn matches(&self, entity: Entity) -> bool {
        self.required.iter().all(|store| store.contains(entity))
            && !self.excluded.iter().any(|store| store.contains(entity))
    }

    /// Entities of the smallest required store; first declared wins ties.
    fn candidates(&self) -> &'w [Entity] {
        if self.fetch.is_none() {
            return &[];
        }
        match self.required.iter().copied().min_by_key(|store| store.len()) {
            Some(store) => store.entities(),
            None => &[],
        }
    }

    /// Iterate with mutable access to the `&mut` components.
    pub fn iter_mut(&mut self) -> QueryIter<'_, 'w, D, F> {
        QueryIter {
            candidates: self.candidates(),
            query: self,
            position: 0,
        }
    }

    /// Fetch a single entity, if it matches.
    pub fn get_mut(&mut self, entity: Entity) -> Option<D::Item<'_>> {
        if !self.matches(entity) {
            return None;
        }
        let fetch = self.fetch.as_ref()?;
        // SAFETY: `&mut self` keeps any other item of this handle dead.
        unsafe { D::fetch(fetch, entity) }
    }

    /// Number of matching entities.
    pub fn count(&self) -> usize {
        self.candidates()
            .iter()
            .filter(|&&entity| self.matches(entity))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Matching entities in iteration order.
    pub fn entities(&self) -> Vec<Entity> {
        self.candidates()
            .iter()
            .copied()
            .filter(|&entity| self.matches(entity))
            .collect()
    }
}

impl<'w, D: ReadOnlyQueryData, F: QueryFilter> Query<'w, D, F> {
    pub fn iter(&self) -> QueryIter<'_, 'w, D, F> {
        QueryIter {
            candidates: self.candidates(),
            query: self,
            position: 0,
        }
    }

    pub fn get(&self, entity: Entity) -> Option<D::Item<'_>> {
        if !self.matches(entity) {
            return None;
        }
        let fetch = self.fetch.as_ref()?;
        // SAFETY: read-only data hands out shared references only.
        unsafe { D::fetch(fetch, entity) }
    }
}

/// Iterator over a query. Yields `(Entity, D::Item)` for each matching entity.
pub struct QueryIter<'q, 'w, D: QueryData, F: QueryFilter> {
    query: &'q Query<'w, D, F>,
    candidates: &'w [Entity],
    position: usize,
}

impl<'q, 'w, D: QueryData, F: QueryFilter> Iterator for QueryIter<'q, 'w, D, F> {
    type Item = (Entity, D::Item<'q>);

    fn next(&mut self) -> Option<Self::Item> {
        let query = self.query;
        let fetch = query.fetch.as_ref()?;
        while let Some(&entity) = self.candidates.get(self.position) {
            self.position += 1;
            if !query.matches(entity) {
                continue;
            }
            // SAFETY: candidates come from one store's entity list, so each
            // entity is visited once per iterator; the iterator borrows the
            // handle mutably (or the data is read-only).
            if let Some(item) = unsafe { D::fetch(fetch, entity) } {
                return Some((entity, item));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.candidates.len() - self.position))
    }
}

impl<'q, 'w, D: QueryData, F: QueryFilter> IntoIterator for &'q mut Query<'w, D, F> {
    type Item = (Entity, D::Item<'q>);
    type IntoIter = QueryIter<'q, 'w, D, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<'q, 'w, D: ReadOnlyQueryData, F: QueryFilter> IntoIterator for &'q Query<'w, D, F> {
    type Item = (Entity, D::Item<'q>);
    type IntoIter = QueryIter<'q, 'w, D, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Frozen;

    #[derive(Debug, Clone, PartialEq)]
    struct Name(String);

    fn moving_world() -> (World, Vec<Entity>) {
        let mut world = World::new();
        let e: Vec<_> = (0..4).map(|_| world.spawn()).collect();
        for (i, &entity) in e.iter().enumerate() {
            world.insert_component(entity, Position { x: i as f32, y: 0.0 });
        }
        world.insert_component(e[0], Velocity { dx: 1.0, dy: 0.0 });
        world.insert_component(e[1], Velocity { dx: 2.0, dy: 0.0 });
        world.insert_component(e[3], Velocity { dx: 3.0, dy: 0.0 });
        world.insert_component(e[1], Frozen);
        (world, e)
    }

    #[test]
    fn query_single_component() {
        let (world, _) = moving_world();
        let query = world.query::<(&Position,)>().unwrap();
        assert_eq!(query.iter().count(), 4);
    }

    #[test]
    fn query_intersects_required() {
        let (world, e) = moving_world();
        let query = world.query::<(&Position, &Velocity)>().unwrap();
        assert_eq!(query.entities(), vec![e[0], e[1], e[3]]);
    }

    #[test]
    fn query_excludes() {
        let (world, e) = moving_world();
        let query = world
            .query_filtered::<(&Position, &Velocity), Without<Frozen>>()
            .unwrap();
        assert_eq!(query.entities(), vec![e[0], e[3]]);
    }

    #[test]
    fn with_filter_requires_without_borrowing() {
        let (world, e) = moving_world();
        let mut frozen = world.query_filtered::<(&mut Position,), With<Frozen>>().unwrap();
        for (_, (pos,)) in frozen.iter_mut() {
            pos.y = -1.0;
        }
        assert_eq!(frozen.entities(), vec![e[1]]);
        // `With<Frozen>` took no lock on the frozen store.
        assert!(world.query::<(&Frozen,)>().is_ok());
    }

    #[test]
    fn mutation_through_query() {
        let (world, e) = moving_world();
        {
            let mut query = world.query::<(&mut Position, &Velocity)>().unwrap();
            for (_, (pos, vel)) in &mut query {
                pos.x += vel.dx;
                pos.y += vel.dy;
            }
        }
        assert_eq!(world.get::<Position>(e[0]).unwrap().x, 1.0);
        assert_eq!(world.get::<Position>(e[1]).unwrap().x, 3.0);
        assert_eq!(world.get::<Position>(e[2]).unwrap().x, 2.0);
        assert_eq!(world.get::<Position>(e[3]).unwrap().x, 6.0);
    }

    #[test]
    fn driving_store_is_smallest() {
        let (mut world, e) = moving_world();
        let named = world.spawn();
        world.insert_component(named, Name("solo".into()));
        world.insert_component(e[2], Name("two".into()));

        let query = world.query::<(&Position, &Name)>().unwrap();
        // The name store drives, so its insertion order wins.
        assert_eq!(query.candidates(), &[named, e[2]]);
        assert_eq!(query.entities(), vec![e[2]]);
    }

    #[test]
    fn missing_store_matches_nothing() {
        let (world, _) = moving_world();
        let query = world.query::<(&Position, &Name)>().unwrap();
        assert!(query.is_empty());
        assert_eq!(query.iter().next(), None);
    }

    #[test]
    fn missing_excluded_store_excludes_nothing() {
        let (world, _) = moving_world();
        let query = world
            .query_filtered::<(&Position,), Without<Name>>()
            .unwrap();
        assert_eq!(query.count(), 4);
    }

    #[test]
    fn get_single_entity() {
        let (world, e) = moving_world();
        let mut query = world.query::<(&mut Velocity,)>().unwrap();
        assert!(query.get_mut(e[2]).is_none());
        let (vel,) = query.get_mut(e[3]).unwrap();
        vel.dx = 10.0;
        drop(query);
        assert_eq!(world.get::<Velocity>(e[3]).unwrap().dx, 10.0);

        let read = world.query::<(&Velocity,)>().unwrap();
        assert_eq!(read.get(e[0]), Some((&Velocity { dx: 1.0, dy: 0.0 },)));
    }

    #[test]
    fn read_only_iteration_is_repeatable() {
        let (world, _) = moving_world();
        let query = world.query::<(&Position, &Velocity)>().unwrap();
        let first: Vec<_> = query.iter().map(|(e, (p, v))| (e, p.clone(), v.clone())).collect();
        let second: Vec<_> = query.iter().map(|(e, (p, v))| (e, p.clone(), v.clone())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn live_write_handle_blocks_second_handle() {
        let (world, _) = moving_world();
        let writer = world.query::<(&mut Position,)>().unwrap();
        assert!(matches!(
            world.query::<(&Position,)>(),
            Err(EcsError::AlreadyBorrowed { .. })
        ));
        drop(writer);
        let a = world.query::<(&Position,)>().unwrap();
        let b = world.query::<(&Position, &Velocity)>().unwrap();
        assert_eq!(a.count(), 4);
        assert_eq!(b.count(), 3);
    }

    #[test]
    fn invalid_signatures_rejected() {
        let (world, _) = moving_world();
        assert!(matches!(
            world.query_filtered::<(&Position,), Without<Position>>(),
            Err(EcsError::RequiredAndExcluded { .. })
        ));
        assert!(matches!(
            world.query::<(&mut Position, &Position)>(),
            Err(EcsError::ConflictingAccess { .. })
        ));
    }
}
