//! Query signatures and the access sets derived from them.
//!
//! A signature is the runtime description of a typed query: which component
//! types an entity must have (and how each is accessed), and which it must
//! not have. Typed queries produce one through [`QuerySignature::of`]; the
//! builder methods produce the same value by hand.

use std::fmt;

use crate::component::{Component, ComponentId};
use crate::error::EcsError;
use crate::query::{QueryData, QueryFilter};

/// How a required component is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Shared borrow of the component value.
    Read,
    /// Exclusive borrow of the component value.
    Write,
    /// Must be present; the value is never borrowed (`With<T>`).
    Presence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySignature {
    required: Vec<(ComponentId, Access)>,
    excluded: Vec<ComponentId>,
}

impl QuerySignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// The signature of a typed query.
    pub fn of<D: QueryData, F: QueryFilter>() -> Self {
        let mut signature = Self::new();
        D::signature(&mut signature);
        F::signature(&mut signature);
        signature
    }

    pub fn read<T: Component>(mut self) -> Self {
        self.add_required(ComponentId::of::<T>(), Access::Read);
        self
    }

    pub fn write<T: Component>(mut self) -> Self {
        self.add_required(ComponentId::of::<T>(), Access::Write);
        self
    }

    pub fn with<T: Component>(mut self) -> Self {
        self.add_required(ComponentId::of::<T>(), Access::Presence);
        self
    }

    pub fn without<T: Component>(mut self) -> Self {
        self.add_excluded(ComponentId::of::<T>());
        self
    }

    pub fn add_required(&mut self, component: ComponentId, access: Access) {
        self.required.push((component, access));
    }

    pub fn add_excluded(&mut self, component: ComponentId) {
        self.excluded.push(component);
    }

    /// Required components in declaration order.
    pub fn required(&self) -> &[(ComponentId, Access)] {
        &self.required
    }

    pub fn excluded(&self) -> &[ComponentId] {
        &self.excluded
    }

    /// Component types whose values this signature borrows shared.
    pub fn reads(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.accessed(Access::Read)
    }

    /// Component types whose values this signature borrows exclusively.
    pub fn writes(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.accessed(Access::Write)
    }

    fn accessed(&self, access: Access) -> impl Iterator<Item = ComponentId> + '_ {
        self.required
            .iter()
            .filter(move |(_, a)| *a == access)
            .map(|(id, _)| *id)
    }

    /// Reject signatures that match nothing meaningful or would alias.
    pub fn validate(&self) -> Result<(), EcsError> {
        if self.required.is_empty() {
            return Err(EcsError::NoRequiredComponents);
        }

        if let Some((id, _)) = self
            .required
            .iter()
            .find(|(id, _)| self.excluded.contains(id))
        {
            return Err(EcsError::RequiredAndExcluded {
                component: id.name(),
            });
        }

        for (i, (id, access)) in self.required.iter().enumerate() {
            if *access != Access::Write {
                continue;
            }
            let aliased = self
                .required
                .iter()
                .enumerate()
                .any(|(j, (other, a))| j != i && other == id && *a != Access::Presence);
            if aliased {
                return Err(EcsError::ConflictingAccess {
                    component: id.name(),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Query<")?;
        let mut first = true;
        let entries = self
            .required
            .iter()
            .map(|(id, access)| {
                let verb = match access {
                    Access::Read => "read",
                    Access::Write => "write",
                    Access::Presence => "with",
                };
                (verb, id)
            })
            .chain(self.excluded.iter().map(|id| ("without", id)));
        for (verb, id) in entries {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{verb} {id}")?;
        }
        f.write_str(">")
    }
}

/// Union of the component reads and writes of one or more signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemAccess {
    reads: Vec<ComponentId>,
    writes: Vec<ComponentId>,
}

impl SystemAccess {
    pub fn from_signatures<'a>(signatures: impl IntoIterator<Item = &'a QuerySignature>) -> Self {
        let mut access = Self::default();
        for signature in signatures {
            for id in signature.reads() {
                if !access.reads.contains(&id) {
                    access.reads.push(id);
                }
            }
            for id in signature.writes() {
                if !access.writes.contains(&id) {
                    access.writes.push(id);
                }
            }
        }
        access
    }

    pub fn reads(&self) -> &[ComponentId] {
        &self.reads
    }

    pub fn writes(&self) -> &[ComponentId] {
        &self.writes
    }

    /// First component both sides touch where at least one side writes.
    pub fn conflicts_with(&self, other: &SystemAccess) -> Option<ComponentId> {
        self.writes
            .iter()
            .find(|id| other.writes.contains(*id) || other.reads.contains(*id))
            .or_else(|| self.reads.iter().find(|id| other.writes.contains(*id)))
            .copied()
    }

    /// Fold `other` into this access set.
    pub fn extend(&mut self, other: &SystemAccess) {
        for id in &other.reads {
            if !self.reads.contains(id) {
                self.reads.push(*id);
            }
        }
        for id in &other.writes {
            if !self.writes.contains(id) {
                self.writes.push(*id);
            }
        }
    }
}
