//! Demo population and systems driven by the binary

use anyhow::Context;
use kestrel_ecs::{App, EcsError, QuerySystem, SystemBuilder, With, Without, World};
use tracing::info;

/// Marks an entity as a person
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Person;

#[derive(Debug, Clone, PartialEq)]
pub struct FirstName(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct LastName(pub String);

/// How many times a person has been visited by the counting system
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccessCounter(pub u64);

/// Spawn six entities; only the first two carry every person component.
pub fn populate(world: &mut World) {
    world.spawn_with((
        Person,
        FirstName("Ada".into()),
        LastName("Lovelace".into()),
        AccessCounter::default(),
    ));
    world.spawn_with((
        Person,
        FirstName("Alan".into()),
        LastName("Turing".into()),
        AccessCounter::default(),
    ));
    world.spawn_with((Person, FirstName("Grace".into())));
    world.spawn_with((Person, LastName("Hopper".into()), AccessCounter::default()));
    world.spawn_with((FirstName("Not".into()), LastName("APerson".into())));
    world.spawn_with((AccessCounter::default(),));
}

/// Register the demo systems in their run order.
pub fn register(app: &mut App) -> Result<(), EcsError> {
    app.add_startup(populate)?;

    app.add_system(QuerySystem::<(
        &Person,
        &FirstName,
        &LastName,
        &mut AccessCounter,
    )>::new("count_access", |query| {
        for (_, (_, _, _, counter)) in query.iter_mut() {
            counter.0 += 1;
        }
        Ok(())
    }))?;

    app.add_system(
        SystemBuilder::new("greet")
            .with_query_filtered::<(&FirstName, &LastName, &AccessCounter), With<Person>>()
            .with_query_filtered::<(&FirstName,), (With<Person>, Without<LastName>)>()
            .build(|ctx| {
                let full = ctx
                    .query_filtered::<(&FirstName, &LastName, &AccessCounter), With<Person>>()
                    .context("opening full-name query")?;
                for (entity, (first, last, counter)) in full.iter() {
                    info!("{} {} ({}) seen {} times", first.0, last.0, entity, counter.0);
                }

                let partial = ctx
                    .query_filtered::<(&FirstName,), (With<Person>, Without<LastName>)>()
                    .context("opening first-name-only query")?;
                for (entity, (first,)) in partial.iter() {
                    info!("{} ({}) has no last name", first.0, entity);
                }
                Ok(())
            }),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_advance_once_per_tick() {
        let mut app = App::new();
        register(&mut app).unwrap();
        assert!(app.run(4).is_empty());

        let world = app.world();
        assert_eq!(world.entity_count(), 6);
        let query = world.query::<(&FirstName, &AccessCounter)>().unwrap();
        let counts: Vec<_> = query.iter().map(|(_, (name, c))| (name.0.clone(), c.0)).collect();
        assert_eq!(counts, vec![("Ada".to_string(), 4), ("Alan".to_string(), 4)]);

        let untouched = world
            .query_filtered::<(&AccessCounter,), Without<FirstName>>()
            .unwrap()
            .iter()
            .map(|(_, (c,))| c.0)
            .collect::<Vec<_>>();
        assert_eq!(untouched, vec![0, 0]);
    }
}
