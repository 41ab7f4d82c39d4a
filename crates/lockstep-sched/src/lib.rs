//! Cycle-accurate cooperative scheduling of clocked actors.
//!
//! Each emulated chip is an actor: a main routine on its own [`lockstep_fiber::Fiber`] plus a
//! local clock. All clocks share one fixed-point unit, `1 / (master_rate * subticks)` seconds, so
//! actors at unrelated frequencies compare directly. An actor runs ahead until it needs another
//! chip's state, then calls [`Actor::synchronize`], which runs every lagging target until it
//! has caught up. Clock ties go to the actor registered first.
//!
//! The host owns a [`Scheduler`] and calls [`Scheduler::enter`] in a loop; each call returns
//! when an actor exits with an [`Event`] (frame done, audio ready, ...). Snapshots go through
//! [`Scheduler::quiesce`] first so every actor sits at the top of its main routine; see the
//! `Serializable` impls on [`Scheduler`] and [`Actor`].

mod actor;
mod config;
mod error;
mod event;
mod frequency;
mod scheduler;
mod shared;

pub use crate::actor::{Actor, ActorId, ActorState};
pub use crate::config::{
    SchedulerConfig, DEFAULT_MASTER_RATE, DEFAULT_RETRY_LIMIT, DEFAULT_SUBTICKS,
};
pub use crate::error::{ConfigurationError, Result, SchedulerError};
pub use crate::event::{Event, ExitReason};
pub use crate::frequency::Frequency;
pub use crate::scheduler::Scheduler;
