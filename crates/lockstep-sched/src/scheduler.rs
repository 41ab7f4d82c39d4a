use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use lockstep_fiber::{Fiber, FiberError, Resume};
use lockstep_state::{Serializable, SerializationError, Serializer};
use tracing::debug;

use crate::actor::{Actor, ActorId, ActorState};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::{Event, ExitReason};
use crate::frequency::{Frequency, Scale};
use crate::shared::Core;

type Iteration = Pin<Box<dyn Future<Output = Result<()>>>>;
type MainFn = Rc<RefCell<dyn FnMut(Actor) -> Iteration>>;

struct Entry {
    main: MainFn,
    fiber: Fiber<Result<()>>,
}

/// Body of every actor fiber: the main routine, forever, with a safe point before each
/// iteration. The fiber only finishes if an iteration fails.
async fn run(actor: Actor, main: MainFn) -> Result<()> {
    loop {
        actor.safe_point().await;
        let iteration = {
            let mut main = main.borrow_mut();
            (&mut *main)(actor.clone())
        };
        iteration.await?;
    }
}

/// Cooperative scheduler for a set of clocked actors.
///
/// Every actor owns a fiber running its main routine and a local clock in shared fixed-point
/// units. Actors run until they explicitly hand over: [`Actor::synchronize`] switches to a
/// lagging actor, [`Actor::exit`] returns to the host. The host drives the whole system through
/// [`Scheduler::enter`], one exit event at a time.
///
/// Everything runs on the calling thread. Between two `enter` calls no actor code runs, so the
/// host may freely inspect and mutate component state.
pub struct Scheduler {
    core: Rc<RefCell<Core>>,
    /// Indexed by actor slot.
    entries: Vec<Option<Entry>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: Rc::new(RefCell::new(Core::new(config))),
            entries: Vec::new(),
        })
    }

    pub fn config(&self) -> SchedulerConfig {
        self.core.borrow().config
    }

    /// Registers an actor running `main` at `frequency`, with its clock at zero.
    ///
    /// `main` is invoked once per iteration with a fresh [`Actor`] context and loops for the
    /// lifetime of the actor; its future returning `Err` stops the actor and surfaces the error
    /// from [`Scheduler::enter`]. The first actor registered becomes the primary one.
    pub fn create<F, Fut>(
        &mut self,
        name: impl Into<String>,
        frequency: Frequency,
        mut main: F,
    ) -> Result<ActorId>
    where
        F: FnMut(Actor) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let name = name.into();
        let scale = Scale::new(&self.config(), frequency)?;
        let id = self.core.borrow_mut().insert(name.clone(), frequency, scale);

        let main: MainFn = Rc::new(RefCell::new(move |actor: Actor| -> Iteration {
            Box::pin(main(actor))
        }));
        let fiber = self.spawn(id, &main);

        let index = id.index as usize;
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, || None);
        }
        self.entries[index] = Some(Entry { main, fiber });

        debug!(actor = %name, %id, %frequency, "actor created");
        Ok(id)
    }

    /// Removes an actor and drops its fiber wherever it is suspended. The handle and any copy
    /// of it become stale.
    pub fn destroy(&mut self, id: ActorId) -> Result<()> {
        let record = self.core.borrow_mut().remove(id)?;
        if let Some(entry) = self.entries.get_mut(id.index as usize) {
            *entry = None;
        }
        debug!(actor = %record.name, %id, "actor destroyed");
        Ok(())
    }

    /// Picks the actor resumed by [`Scheduler::enter`] after power-on, reset or a restore.
    pub fn set_primary(&mut self, id: ActorId) -> Result<()> {
        let mut core = self.core.borrow_mut();
        core.record(id)?;
        core.primary = Some(id);
        Ok(())
    }

    pub fn primary(&self) -> Option<ActorId> {
        self.core.borrow().primary
    }

    /// Changes an actor's rate from now on. Its clock keeps its value.
    pub fn set_frequency(&mut self, id: ActorId, frequency: Frequency) -> Result<()> {
        let scale = Scale::new(&self.config(), frequency)?;
        let mut core = self.core.borrow_mut();
        let record = core.record_mut(id)?;
        record.fraction = scale.convert_fraction(record.fraction, &record.scale);
        record.scale = scale;
        record.frequency = frequency;
        Ok(())
    }

    /// Context handle for `id`, e.g. for a component that serializes its own clock.
    pub fn actor(&self, id: ActorId) -> Result<Actor> {
        self.core.borrow().record(id)?;
        Ok(Actor::new(id, self.core.clone()))
    }

    /// Runs the system until some actor exits to the host.
    ///
    /// Resumes the current actor (the primary one after power-on), follows every switch it and
    /// its successors make and returns the first exit event.
    pub fn enter(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.resume_current()? {
                return Ok(event);
            }
        }
    }

    /// Resumes the current actor once and applies whatever it asked for on suspension.
    fn resume_current(&mut self) -> Result<Option<Event>> {
        let id = self.core.borrow().current.ok_or(SchedulerError::NoActors)?;
        self.core.borrow_mut().begin_slice(id)?;

        let entry = self
            .entries
            .get_mut(id.index as usize)
            .and_then(Option::as_mut)
            .ok_or(SchedulerError::StaleHandle(id))?;
        let resumed = entry.fiber.resume();

        let mut core = self.core.borrow_mut();
        match resumed {
            Ok(Resume::Yielded) => core.end_slice(id),
            Ok(Resume::Finished(result)) => {
                core.mark_exited(id);
                let name = core.record(id)?.name.clone();
                debug!(actor = %name, %id, "actor stopped");
                Err(result.err().unwrap_or(SchedulerError::Exited(name)))
            }
            Err(FiberError::Finished) => Err(SchedulerError::Exited(core.record(id)?.name.clone())),
        }
    }

    /// Drives every actor to its safe point: the current actor first, then the others in
    /// registration order. Rendezvous return at once meanwhile, so no actor waits on another.
    ///
    /// Afterwards no actor is mid-iteration and a snapshot taken now can be restored into a
    /// freshly created system. A second call without an intervening `enter` does nothing.
    pub fn quiesce(&mut self) -> Result<()> {
        let sequence = {
            let mut core = self.core.borrow_mut();
            if core.quiesced {
                return Ok(());
            }
            let current = core.current;
            core.begin_quiesce();
            let mut sequence: Vec<ActorId> = current.into_iter().collect();
            sequence.extend(core.order.iter().copied().filter(|&id| Some(id) != current));
            sequence
        };

        let result = self.park_all(&sequence);
        self.core.borrow_mut().end_quiesce(result.is_ok());
        if result.is_ok() {
            debug!(actors = sequence.len(), "scheduler quiesced");
        }
        result
    }

    fn park_all(&mut self, sequence: &[ActorId]) -> Result<()> {
        for &id in sequence {
            self.core.borrow_mut().current = Some(id);
            loop {
                let event = self.resume_current()?;
                let parked = self.core.borrow().is_parked(id);
                if parked && event.map(|e| e.reason) == Some(ExitReason::Synchronize) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Zeroes every clock and restarts every main routine from the top. The primary actor runs
    /// first on the next `enter`.
    pub fn power(&mut self) {
        self.core.borrow_mut().power();
        self.restart_fibers();
        debug!(actors = self.len(), "scheduler powered");
    }

    pub fn reset(&mut self) {
        self.power();
    }

    fn restart_fibers(&mut self) {
        let order = self.core.borrow().order.clone();
        for id in order {
            let main = match self.entries.get(id.index as usize).and_then(Option::as_ref) {
                Some(entry) => entry.main.clone(),
                None => continue,
            };
            let fiber = self.spawn(id, &main);
            if let Some(Some(entry)) = self.entries.get_mut(id.index as usize) {
                entry.fiber = fiber;
            }
        }
    }

    fn spawn(&self, id: ActorId, main: &MainFn) -> Fiber<Result<()>> {
        Fiber::new(run(Actor::new(id, self.core.clone()), main.clone()))
    }

    pub fn len(&self) -> usize {
        self.core.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live actors in registration order.
    pub fn actors(&self) -> Vec<ActorId> {
        self.core.borrow().order.clone()
    }

    /// Live actors from furthest behind to furthest ahead, ties in registration order.
    pub fn dispatch_order(&self) -> Vec<ActorId> {
        let core = self.core.borrow();
        let mut ids = core.order.clone();
        ids.sort_by_key(|&id| core.key(id).unwrap_or((i64::MAX, u64::MAX)));
        ids
    }

    pub fn current(&self) -> Option<ActorId> {
        self.core.borrow().current
    }

    pub fn last_event(&self) -> Option<Event> {
        self.core.borrow().last_event
    }

    pub fn quiesced(&self) -> bool {
        self.core.borrow().quiesced
    }

    pub fn clock(&self, id: ActorId) -> Result<i64> {
        Ok(self.core.borrow().record(id)?.clock)
    }

    pub fn name(&self, id: ActorId) -> Result<String> {
        Ok(self.core.borrow().record(id)?.name.clone())
    }

    pub fn state(&self, id: ActorId) -> Result<ActorState> {
        Ok(self.core.borrow().record(id)?.state)
    }

    pub fn frequency(&self, id: ActorId) -> Result<Frequency> {
        Ok(self.core.borrow().record(id)?.frequency)
    }

    /// Smallest clock among live actors.
    pub fn minimum(&self) -> Option<i64> {
        self.core.borrow().records().map(|(_, r)| r.clock).min()
    }

    pub fn maximum(&self) -> Option<i64> {
        self.core.borrow().records().map(|(_, r)| r.clock).max()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Scheduler")
            .field("actors", &core.order.len())
            .field("current", &core.current)
            .field("primary", &core.primary)
            .field("quiesced", &core.quiesced)
            .finish()
    }
}

/// Scheduler block of a snapshot: the actor count and whether the system was quiesced.
///
/// Actor clocks belong to the components that own the actors (see the `Serializable` impl on
/// [`Actor`]). Reading a quiesced snapshot restarts every main routine from the top, since the
/// saved system had no iteration in flight; otherwise fibers keep their continuations and only
/// the clocks change.
impl Serializable for Scheduler {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> lockstep_state::Result<()> {
        let offset = s.position();
        let count = u32::try_from(self.len()).map_err(|_| SerializationError::CorruptState {
            offset,
            reason: "too many actors",
        })?;
        if s.value(count)? != count {
            return Err(SerializationError::CorruptState {
                offset,
                reason: "actor count differs from this system",
            });
        }

        let quiesced = s.value(self.quiesced())?;
        if s.reading() && quiesced {
            self.core.borrow_mut().restart();
            self.restart_fibers();
            debug!(actors = count, "scheduler restored from quiesced snapshot");
        }
        Ok(())
    }
}
