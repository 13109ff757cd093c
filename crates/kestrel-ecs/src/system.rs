use std::marker::PhantomData;

use crate::error::EcsError;
use crate::query::{Query, QueryData, QueryFilter};
use crate::signature::QuerySignature;
use crate::world::World;

/// A unit of logic run once per tick against the world.
///
/// A system only sees the world through the queries it declares in
/// [`System::signatures`]; the scheduler validates them at registration.
pub trait System: Send + Sync {
    fn name(&self) -> &str;

    fn signatures(&self) -> &[QuerySignature];

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()>;
}

/// Handle passed to a running system. Valid only for that invocation.
pub struct SystemContext<'w> {
    world: &'w World,
    system: &'w str,
    signatures: &'w [QuerySignature],
}

impl<'w> SystemContext<'w> {
    pub(crate) fn new(world: &'w World, system: &'w str, signatures: &'w [QuerySignature]) -> Self {
        Self {
            world,
            system,
            signatures,
        }
    }

    pub fn system_name(&self) -> &str {
        self.system
    }

    /// Open one of the declared queries.
    pub fn query<D: QueryData>(&self) -> Result<Query<'w, D>, EcsError> {
        self.query_filtered::<D, ()>()
    }

    /// Open one of the declared filtered queries.
    pub fn query_filtered<D: QueryData, F: QueryFilter>(&self) -> Result<Query<'w, D, F>, EcsError> {
        let signature = QuerySignature::of::<D, F>();
        if !self.signatures.contains(&signature) {
            return Err(EcsError::UndeclaredQuery {
                system: self.system.to_string(),
                signature: signature.to_string(),
            });
        }
        Query::new(self.world, signature)
    }
}

/// Builds a closure-backed system from a name and its declared queries.
pub struct SystemBuilder {
    name: String,
    signatures: Vec<QuerySignature>,
}

impl SystemBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signatures: Vec::new(),
        }
    }

    pub fn with_query<D: QueryData>(self) -> Self {
        self.with_signature(QuerySignature::of::<D, ()>())
    }

    pub fn with_query_filtered<D: QueryData, F: QueryFilter>(self) -> Self {
        self.with_signature(QuerySignature::of::<D, F>())
    }

    /// Declare a hand-built signature. Typed queries opened through the
    /// context must produce an identical signature.
    pub fn with_signature(mut self, signature: QuerySignature) -> Self {
        self.signatures.push(signature);
        self
    }

    pub fn build<Func>(self, func: Func) -> FnSystem<Func>
    where
        Func: FnMut(&SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        FnSystem {
            name: self.name,
            signatures: self.signatures,
            func,
        }
    }
}

/// A system whose body receives the full [`SystemContext`].
pub struct FnSystem<Func> {
    name: String,
    signatures: Vec<QuerySignature>,
    func: Func,
}

impl<Func> System for FnSystem<Func>
where
    Func: FnMut(&SystemContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn signatures(&self) -> &[QuerySignature] {
        &self.signatures
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        (self.func)(ctx)
    }
}

type QueryBody<D, F> = Box<dyn for<'w> FnMut(&mut Query<'w, D, F>) -> anyhow::Result<()> + Send + Sync>;

/// A system bound to exactly one query, handed to the body each tick.
///
/// ```ignore
/// let system = QuerySystem::<(&mut Position, &Velocity)>::new("movement", |query| {
///     for (_, (pos, vel)) in query.iter_mut() {
///         pos.x += vel.dx;
///     }
///     Ok(())
/// });
/// ```
pub struct QuerySystem<D: QueryData, F: QueryFilter = ()> {
    name: String,
    signatures: [QuerySignature; 1],
    body: QueryBody<D, F>,
    _marker: PhantomData<fn() -> (D, F)>,
}

impl<D: QueryData> QuerySystem<D, ()> {
    pub fn new(
        name: impl Into<String>,
        body: impl for<'w> FnMut(&mut Query<'w, D, ()>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::filtered(name, body)
    }
}

impl<D: QueryData, F: QueryFilter> QuerySystem<D, F> {
    pub fn filtered(
        name: impl Into<String>,
        body: impl for<'w> FnMut(&mut Query<'w, D, F>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signatures: [QuerySignature::of::<D, F>()],
            body: Box::new(body),
            _marker: PhantomData,
        }
    }
}

impl<D: QueryData, F: QueryFilter> System for QuerySystem<D, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn signatures(&self) -> &[QuerySignature] {
        &self.signatures
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        let mut query = ctx.query_filtered::<D, F>()?;
        (self.body)(&mut query)
    }
}
