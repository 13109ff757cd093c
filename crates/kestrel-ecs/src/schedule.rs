use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace, warn};

use crate::error::{EcsError, SystemFailure, TickError};
use crate::signature::{QuerySignature, SystemAccess};
use crate::system::{System, SystemContext};
use crate::world::World;

/// Position of a system in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(usize);

impl SystemId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Idle,
    Ticking,
}

struct RegisteredSystem {
    name: String,
    signatures: Vec<QuerySignature>,
    access: SystemAccess,
    system: Box<dyn System>,
}

/// An ordered list of systems run once per tick, in registration order.
pub struct Schedule {
    systems: Vec<RegisteredSystem>,
    state: ScheduleState,
    ticks: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            state: ScheduleState::Idle,
            ticks: 0,
        }
    }

    /// Add a system to the end of the schedule.
    ///
    /// Every declared signature is validated, and two signatures of the same
    /// system may not conflict since both handles can be live at once.
    /// Registration closes once the first tick has run.
    pub fn register_system<S: System + 'static>(&mut self, system: S) -> Result<SystemId, EcsError> {
        let name = system.name().to_string();
        if self.ticks > 0 {
            return Err(EcsError::RegistrationClosed { system: name });
        }

        let signatures = system.signatures().to_vec();
        for signature in &signatures {
            signature.validate()?;
        }
        for (i, a) in signatures.iter().enumerate() {
            let a = SystemAccess::from_signatures([a]);
            for b in &signatures[i + 1..] {
                if let Some(component) = a.conflicts_with(&SystemAccess::from_signatures([b])) {
                    return Err(EcsError::ConflictingSignatures {
                        system: name,
                        component: component.name(),
                    });
                }
            }
        }

        let id = SystemId(self.systems.len());
        debug!(
            "Registered system '{}' with {} queries",
            name,
            signatures.len()
        );
        self.systems.push(RegisteredSystem {
            access: SystemAccess::from_signatures(&signatures),
            name,
            signatures,
            system: Box::new(system),
        });
        Ok(id)
    }

    /// Run every system once, in registration order.
    ///
    /// A failing or panicking system is recorded and the remaining systems
    /// still run. Returns every failure of this tick.
    pub fn tick(&mut self, world: &mut World) -> Result<(), TickError> {
        let world: &World = world;
        let tick = self.ticks;
        self.state = ScheduleState::Ticking;

        let mut failures = Vec::new();
        for registered in &mut self.systems {
            trace!("Tick {}: running system '{}'", tick, registered.name);
            let ctx = SystemContext::new(world, &registered.name, &registered.signatures);
            let system = &mut registered.system;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| system.run(&ctx)))
                .unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))));
            if let Err(error) = outcome {
                warn!("System '{}' failed in tick {}: {:#}", registered.name, tick, error);
                failures.push(SystemFailure {
                    system: registered.name.clone(),
                    error,
                });
            }
        }

        self.ticks += 1;
        self.state = ScheduleState::Idle;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TickError { tick, failures })
        }
    }

    /// Group consecutive systems whose declared access sets are pairwise
    /// disjoint. Systems in one batch could run concurrently; batches must run
    /// in order. Execution itself stays sequential.
    pub fn parallel_batches(&self) -> Vec<Vec<SystemId>> {
        let mut batches: Vec<Vec<SystemId>> = Vec::new();
        let mut batch_access = SystemAccess::default();
        for (index, registered) in self.systems.iter().enumerate() {
            let fits = batches
                .last()
                .is_some_and(|_| batch_access.conflicts_with(&registered.access).is_none());
            if !fits {
                batches.push(Vec::new());
                batch_access = SystemAccess::default();
            }
            batch_access.extend(&registered.access);
            if let Some(batch) = batches.last_mut() {
                batch.push(SystemId(index));
            }
        }
        debug!("Schedule splits into {} batches", batches.len());
        batches
    }

    pub fn access(&self, id: SystemId) -> Option<&SystemAccess> {
        self.systems.get(id.0).map(|r| &r.access)
    }

    pub fn system_name(&self, id: SystemId) -> Option<&str> {
        self.systems.get(id.0).map(|r| r.name.as_str())
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of systems in the schedule.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
