//! Deterministic multi-chip emulation core.
//!
//! - [`fiber`]: cooperative execution contexts every actor runs on.
//! - [`sched`] (re-exported at the top level): clocked actors and the scheduler that keeps them in
//!   causal order.
//! - [`state`]: the positional serializer and the snapshot container.
//!
//! A host registers one actor per chip, drives the system with [`Scheduler::enter`] and, between
//! two `enter` calls, captures the whole machine with [`Scheduler::quiesce`] followed by
//! [`state::save`] over a root object that walks the scheduler, every actor clock and every
//! component in a fixed order.

pub use lockstep_fiber as fiber;
pub use lockstep_sched as sched;
pub use lockstep_state as state;

pub use lockstep_sched::{
    Actor, ActorId, ActorState, ConfigurationError, Event, ExitReason, Frequency, Scheduler,
    SchedulerConfig, SchedulerError,
};
pub use lockstep_state::{Serializable, SerializationError, Serializer, Version};
