use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use lockstep_fiber::yield_now;
use lockstep_state::{Serializable, SerializationError, Serializer};

use crate::error::Result;
use crate::event::ExitReason;
use crate::frequency::Frequency;
use crate::shared::Core;

/// Handle to a registered actor.
///
/// Slots are reused after [`crate::Scheduler::destroy`], so a handle carries the generation of
/// its slot; a handle that outlived its actor is reported as stale instead of aliasing a newer
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ActorId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorState {
    /// Suspended at a safe point, a host exit, or not started yet.
    Idle,
    Running,
    /// Suspended in a rendezvous until its target catches up.
    Waiting,
    /// Its main routine failed; the actor can only be destroyed or powered back on.
    Exited,
}

/// The view an actor's main routine has of the scheduler.
///
/// Cloned into the routine on every iteration. All methods act on the actor this context was
/// created for. The shared state is borrowed only for the duration of each call and never across
/// a suspension, so components may be borrowed freely between `.await`s.
#[derive(Clone)]
pub struct Actor {
    id: ActorId,
    core: Rc<RefCell<Core>>,
}

impl Actor {
    pub(crate) fn new(id: ActorId, core: Rc<RefCell<Core>>) -> Self {
        Self { id, core }
    }

    fn core(&self) -> Ref<'_, Core> {
        self.core.borrow()
    }

    fn core_mut(&self) -> RefMut<'_, Core> {
        self.core.borrow_mut()
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Empty once the actor has been destroyed.
    pub fn name(&self) -> String {
        self.core()
            .record(self.id)
            .map(|record| record.name.clone())
            .unwrap_or_default()
    }

    /// Local time in clock units. Zero once the actor has been destroyed.
    pub fn clock(&self) -> i64 {
        self.core()
            .record(self.id)
            .map(|record| record.clock)
            .unwrap_or(0)
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.core().record(self.id).ok().map(|record| record.frequency)
    }

    /// Local time of another actor.
    pub fn clock_of(&self, other: ActorId) -> Result<i64> {
        Ok(self.core().record(other)?.clock)
    }

    /// Advances the local clock by `cycles` of this actor's own frequency. Never switches.
    pub fn step(&self, cycles: u32) {
        self.core_mut().step(self.id, u64::from(cycles));
    }

    /// Suspends until every target's clock has caught up with this actor's clock, running each
    /// lagging target in turn. Returns at once when nothing lags or when the scheduler is
    /// quiescing.
    ///
    /// Targets are visited in the given order. On return each target was observed caught up at
    /// the moment it handed control back.
    pub async fn synchronize(&self, targets: &[ActorId]) -> Result<()> {
        self.core_mut().check_progress(self.id)?;
        for &target in targets {
            loop {
                let caught_up = self.core_mut().rendezvous(self.id, target)?;
                if caught_up {
                    break;
                }
                yield_now().await;
            }
        }
        Ok(())
    }

    /// [`Actor::synchronize`] against every registered actor, in registration order.
    pub async fn synchronize_all(&self) -> Result<()> {
        let targets = self.core().order.clone();
        self.synchronize(&targets).await
    }

    /// Hands control back to the host. The host's `enter` returns the event; the next `enter`
    /// that picks this actor continues right after this call, clock unchanged.
    pub async fn exit(&self, reason: ExitReason) {
        self.leave(reason, None).await;
    }

    pub async fn exit_with(&self, reason: ExitReason, payload: u64) {
        self.leave(reason, Some(payload)).await;
    }

    async fn leave(&self, reason: ExitReason, payload: Option<u64>) {
        self.core_mut().request_exit(self.id, reason, payload);
        yield_now().await;
    }

    /// Parks the actor here while the scheduler is quiescing. Runs at the top of every
    /// iteration of the main routine.
    pub(crate) async fn safe_point(&self) {
        let parked = self.core_mut().park(self.id);
        if parked {
            yield_now().await;
        }
    }

    /// True while another actor is suspended waiting for this one to catch up. Components use
    /// it to skip work that only matters when running ahead (e.g. speculative rendering).
    pub fn synchronizing(&self) -> bool {
        self.core().synchronizing(self.id)
    }

    /// True while the scheduler is driving actors to their safe points.
    pub fn quiescing(&self) -> bool {
        self.core().quiescing()
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("clock", &self.clock())
            .finish()
    }
}

/// Persists the actor's clock together with its sub-unit remainder. A handle to a destroyed
/// actor has nothing to persist and fails every pass.
impl Serializable for Actor {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> lockstep_state::Result<()> {
        let stale = SerializationError::CorruptState {
            offset: s.position(),
            reason: "actor handle is stale",
        };
        let (clock, fraction, divisor) = self
            .core()
            .record(self.id)
            .map(|record| (record.clock, record.fraction, record.scale.divisor()))
            .map_err(|_| stale.clone())?;

        let offset = s.position();
        let clock = s.value(clock)?;
        if clock < 0 {
            return Err(SerializationError::CorruptState {
                offset,
                reason: "negative actor clock",
            });
        }
        let offset = s.position();
        let fraction = s.value(fraction)?;
        if fraction >= divisor {
            return Err(SerializationError::CorruptState {
                offset,
                reason: "actor clock remainder out of range",
            });
        }

        if s.reading() {
            let mut core = self.core_mut();
            let record = core.record_mut(self.id).map_err(|_| stale)?;
            record.clock = clock;
            record.fraction = fraction;
        }
        Ok(())
    }
}
