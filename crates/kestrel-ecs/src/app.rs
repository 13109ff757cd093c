use tracing::{debug, info};

use crate::error::{EcsError, TickError};
use crate::schedule::{Schedule, SystemId};
use crate::system::System;
use crate::world::World;

type StartupHook = Box<dyn FnOnce(&mut World) + Send>;

/// Owns a world and its schedule. Startup hooks run once before the first
/// tick; systems may only be added until then.
pub struct App {
    world: World,
    schedule: Schedule,
    startup: Vec<StartupHook>,
    started: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            schedule: Schedule::new(),
            startup: Vec::new(),
            started: false,
        }
    }

    /// Queue a hook that populates the world before the first tick.
    pub fn add_startup(&mut self, hook: impl FnOnce(&mut World) + Send + 'static) -> Result<(), EcsError> {
        if self.started {
            return Err(EcsError::RegistrationClosed {
                system: "startup hook".to_string(),
            });
        }
        self.startup.push(Box::new(hook));
        Ok(())
    }

    pub fn add_system<S: System + 'static>(&mut self, system: S) -> Result<SystemId, EcsError> {
        if self.started {
            return Err(EcsError::RegistrationClosed {
                system: system.name().to_string(),
            });
        }
        self.schedule.register_system(system)
    }

    /// Run the startup hooks. Called implicitly by the first tick.
    pub fn startup(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for hook in self.startup.drain(..) {
            hook(&mut self.world);
        }
        info!(
            "Startup complete: {} entities, {} component types, {} systems",
            self.world.entity_count(),
            self.world.component_types().len(),
            self.schedule.len()
        );
        debug!("Parallel batches: {:?}", self.schedule.parallel_batches());
    }

    pub fn tick(&mut self) -> Result<(), TickError> {
        self.startup();
        self.schedule.tick(&mut self.world)
    }

    /// Run `ticks` ticks. A failing tick does not stop the loop; every tick
    /// error is returned.
    pub fn run(&mut self, ticks: u64) -> Vec<TickError> {
        (0..ticks).filter_map(|_| self.tick().err()).collect()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
