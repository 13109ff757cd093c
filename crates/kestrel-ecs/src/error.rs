/// Errors reported by the world, query engine and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("query signature requires no component types")]
    NoRequiredComponents,

    #[error("component '{component}' is both required and excluded")]
    RequiredAndExcluded { component: &'static str },

    #[error("component '{component}' is written and also accessed elsewhere in the same signature")]
    ConflictingAccess { component: &'static str },

    #[error("system '{system}' declares conflicting access to '{component}' across its queries")]
    ConflictingSignatures {
        system: String,
        component: &'static str,
    },

    #[error("cannot register system '{system}': the schedule has already started ticking")]
    RegistrationClosed { system: String },

    #[error("system '{system}' did not declare query {signature}")]
    UndeclaredQuery { system: String, signature: String },

    #[error("component '{component}' is already borrowed by a live query")]
    AlreadyBorrowed { component: &'static str },
}

/// Failures collected while running one tick. Every system still ran.
#[derive(Debug, thiserror::Error)]
#[error("{} system(s) failed during tick {tick}: {}", .failures.len(), summary(.failures))]
pub struct TickError {
    pub tick: u64,
    pub failures: Vec<SystemFailure>,
}

/// A single system failure within a tick.
#[derive(Debug)]
pub struct SystemFailure {
    pub system: String,
    pub error: anyhow::Error,
}

fn summary(failures: &[SystemFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {:#}", f.system, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_error_lists_every_failure() {
        let err = TickError {
            tick: 4,
            failures: vec![
                SystemFailure {
                    system: "movement".into(),
                    error: anyhow::anyhow!("bad velocity"),
                },
                SystemFailure {
                    system: "render".into(),
                    error: anyhow::anyhow!("no target"),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 system(s) failed during tick 4"));
        assert!(msg.contains("movement: bad velocity"));
        assert!(msg.contains("render: no target"));
    }
}
