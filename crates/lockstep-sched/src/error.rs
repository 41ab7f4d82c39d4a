use lockstep_state::SerializationError;
use thiserror::Error;

use crate::actor::ActorId;

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Invalid clock parameters. Raised at construction time, never mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("actor frequency must be positive")]
    ZeroFrequency,

    #[error("master clock rate must be positive")]
    ZeroMasterRate,

    #[error("subtick resolution must be positive")]
    ZeroSubticks,

    #[error("deadlock retry limit must be positive")]
    ZeroRetryLimit,

    #[error("clock units per cycle ({units}/{divisor}) do not fit in 64 bits")]
    ScaleOverflow { units: u128, divisor: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A rendezvous kept waiting on an actor that never moved its clock forward.
    #[error("deadlock: `{waiter}` waited on `{target}` for {stalls} rendezvous without progress")]
    Deadlock {
        waiter: String,
        target: String,
        stalls: u32,
    },

    #[error("actor handle {0} is stale")]
    StaleHandle(ActorId),

    #[error("actor `{0}` has stopped running")]
    Exited(String),

    /// The actor suspended on something other than a rendezvous or an exit.
    #[error("actor `{0}` suspended without synchronizing or exiting")]
    StrayYield(String),

    #[error("no actors are registered")]
    NoActors,

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
