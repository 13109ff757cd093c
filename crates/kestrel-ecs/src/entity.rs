use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique tag of the world that issued an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u32);

impl WorldId {
    pub(crate) fn next() -> Self {
        let id = NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed);
        assert!(id != u32::MAX, "world id space exhausted");
        Self(id)
    }
}

/// An entity handle. Carries a slot index plus the id of the issuing world, so
/// a handle from one world never matches a slot in another.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) world: WorldId,
}

impl Entity {
    /// The slot index of this entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The world that allocated this entity.
    pub fn world(&self) -> WorldId {
        self.world
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}w{})", self.index, self.world.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}w{}", self.index, self.world.0)
    }
}

/// Issues entity slots in increasing order. Slots are never recycled.
pub struct EntityAllocator {
    world: WorldId,
    next: u32,
}

impl EntityAllocator {
    pub fn new(world: WorldId) -> Self {
        Self { world, next: 0 }
    }

    /// Allocate a fresh entity.
    ///
    /// # Panics
    /// Panics once `u32::MAX` entities have been issued.
    pub fn allocate(&mut self) -> Entity {
        let index = self.next;
        self.next = index
            .checked_add(1)
            .unwrap_or_else(|| panic!("entity index space exhausted"));
        Entity {
            index,
            world: self.world,
        }
    }

    /// Whether `entity` was issued by this allocator.
    pub fn contains(&self, entity: Entity) -> bool {
        entity.world == self.world && entity.index < self.next
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Number of entities issued so far.
    pub fn len(&self) -> usize {
        self.next as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sequential() {
        let mut alloc = EntityAllocator::new(WorldId::next());
        let e0 = alloc.allocate();
        let e1 = alloc.allocate();
        assert_eq!(e0.index(), 0);
        assert_eq!(e1.index(), 1);
        assert_ne!(e0, e1);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn foreign_entity_not_contained() {
        let mut a = EntityAllocator::new(WorldId::next());
        let mut b = EntityAllocator::new(WorldId::next());
        let from_a = a.allocate();
        b.allocate();
        assert!(a.contains(from_a));
        assert!(!b.contains(from_a));
    }

    #[test]
    fn unissued_slot_not_contained() {
        let world = WorldId::next();
        let mut alloc = EntityAllocator::new(world);
        assert!(alloc.is_empty());
        alloc.allocate();
        let ahead = Entity { index: 5, world };
        assert!(!alloc.contains(ahead));
    }

    #[test]
    #[should_panic(expected = "entity index space exhausted")]
    fn exhaustion_is_fatal() {
        let world = WorldId::next();
        let mut alloc = EntityAllocator { world, next: u32::MAX };
        alloc.allocate();
    }
}
