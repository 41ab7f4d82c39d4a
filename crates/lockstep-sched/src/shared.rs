//! State shared between the host-side [`crate::Scheduler`] and every actor's [`crate::Actor`]
//! context.

use tracing::{trace, warn};

use crate::actor::{ActorId, ActorState};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::{Event, ExitReason};
use crate::frequency::{Frequency, Scale};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Run,
    Quiesce,
}

/// What the running actor asked for right before it suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    Switch(ActorId),
    Exit(Event),
}

#[derive(Debug)]
pub(crate) struct Record {
    pub(crate) name: String,
    pub(crate) frequency: Frequency,
    pub(crate) scale: Scale,
    pub(crate) clock: i64,
    /// Sub-unit remainder, in `1 / scale.divisor()` units.
    pub(crate) fraction: u64,
    pub(crate) state: ActorState,
    /// Registration sequence; breaks clock ties. Never reused.
    pub(crate) seq: u64,
    pub(crate) parked: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<Record>,
}

/// An actor suspended until `target` catches up. `mark` is the target clock last seen,
/// `epoch` the scheduler-wide progress count at that moment, and `stalls` counts consecutive
/// rendezvous rounds in which no actor clock moved at all.
#[derive(Debug, Clone, Copy)]
struct Wait {
    waiter: ActorId,
    target: ActorId,
    mark: i64,
    epoch: u64,
    stalls: u32,
}

impl Wait {
    fn new(waiter: ActorId, target: ActorId, mark: i64, epoch: u64) -> Self {
        Self {
            waiter,
            target,
            mark,
            epoch,
            stalls: 0,
        }
    }

    /// Records one more round against the target's current clock. Returns `true` once the
    /// wait has gone more than `limit` rounds with nothing anywhere advancing.
    fn observe(&mut self, clock: i64, progress: u64, limit: u32) -> bool {
        if self.mark != clock || self.epoch != progress {
            self.mark = clock;
            self.epoch = progress;
            self.stalls = 0;
            return false;
        }
        self.stalls = self.stalls.saturating_add(1);
        self.stalls > limit
    }
}

#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) config: SchedulerConfig,
    slots: Vec<Slot>,
    /// Live actors in registration order.
    pub(crate) order: Vec<ActorId>,
    next_seq: u64,
    /// Bumped by every step that moves an actor clock.
    progress: u64,
    pub(crate) current: Option<ActorId>,
    pub(crate) primary: Option<ActorId>,
    pub(crate) transfer: Option<Transfer>,
    waits: Vec<Wait>,
    mode: Mode,
    /// Every actor sits at its safe point and nothing has run since.
    pub(crate) quiesced: bool,
    pub(crate) last_event: Option<Event>,
}

impl Core {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            order: Vec::new(),
            next_seq: 0,
            progress: 0,
            current: None,
            primary: None,
            transfer: None,
            waits: Vec::new(),
            mode: Mode::Run,
            quiesced: false,
            last_event: None,
        }
    }

    pub(crate) fn record(&self, id: ActorId) -> Result<&Record> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_ref())
            .ok_or(SchedulerError::StaleHandle(id))
    }

    pub(crate) fn record_mut(&mut self, id: ActorId) -> Result<&mut Record> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_mut())
            .ok_or(SchedulerError::StaleHandle(id))
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (ActorId, &Record)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.record(id).ok().map(|record| (id, record)))
    }

    pub(crate) fn insert(&mut self, name: String, frequency: Frequency, scale: Scale) -> ActorId {
        let record = Record {
            name,
            frequency,
            scale,
            clock: 0,
            fraction: 0,
            state: ActorState::Idle,
            seq: self.next_seq,
            parked: false,
        };
        self.next_seq += 1;

        let index = match self.slots.iter().position(|slot| slot.record.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.record = Some(record);
        let id = ActorId {
            index: index as u32,
            generation: slot.generation,
        };

        self.order.push(id);
        if self.primary.is_none() {
            self.primary = Some(id);
        }
        if self.current.is_none() {
            self.current = self.primary;
        }
        self.quiesced = false;
        id
    }

    pub(crate) fn remove(&mut self, id: ActorId) -> Result<Record> {
        self.record(id)?;
        let slot = &mut self.slots[id.index as usize];
        let record = slot.record.take().ok_or(SchedulerError::StaleHandle(id))?;
        slot.generation = slot.generation.wrapping_add(1);

        self.order.retain(|&other| other != id);
        self.waits.retain(|w| w.waiter != id && w.target != id);
        if self.transfer == Some(Transfer::Switch(id)) {
            self.transfer = None;
        }
        if self.primary == Some(id) {
            self.primary = self.order.first().copied();
        }
        if self.current == Some(id) {
            self.current = self.primary;
        }
        Ok(record)
    }

    /// Dispatch key: the lower key is behind. Equal clocks fall back to registration order.
    pub(crate) fn key(&self, id: ActorId) -> Result<(i64, u64)> {
        let record = self.record(id)?;
        Ok((record.clock, record.seq))
    }

    pub(crate) fn step(&mut self, id: ActorId, cycles: u64) {
        let Ok(record) = self.record_mut(id) else {
            return;
        };
        let scale = record.scale;
        let before = (record.clock, record.fraction);
        if scale.advance(&mut record.clock, &mut record.fraction, cycles) {
            warn!(actor = %record.name, "actor clock saturated at i64::MAX");
        }
        if (record.clock, record.fraction) != before {
            self.progress = self.progress.wrapping_add(1);
        }
    }

    /// Stall accounting for everyone waiting on `id`, run whenever `id` starts a rendezvous.
    /// An actor that keeps synchronizing while no clock in the system moves cannot satisfy its
    /// waiters. Hand-offs to third actors that do advance never count as stalls.
    pub(crate) fn check_progress(&mut self, id: ActorId) -> Result<()> {
        if self.mode == Mode::Quiesce {
            return Ok(());
        }
        let clock = self.record(id)?.clock;
        let limit = self.config.retry_limit;
        let progress = self.progress;
        let mut stalled = None;
        for wait in self.waits.iter_mut().filter(|w| w.target == id) {
            if wait.observe(clock, progress, limit) {
                stalled = Some(*wait);
            }
        }
        match stalled {
            Some(wait) => Err(self.deadlock(wait)),
            None => Ok(()),
        }
    }

    /// One round of `caller` waiting on `target`. Returns `true` once the target has caught up.
    /// Otherwise records the wait and requests a switch to the target; the caller must then
    /// suspend. A target destroyed in the meantime counts as caught up.
    pub(crate) fn rendezvous(&mut self, caller: ActorId, target: ActorId) -> Result<bool> {
        if self.mode == Mode::Quiesce {
            return Ok(true);
        }
        let caller_key = self.key(caller)?;
        let Ok(target_record) = self.record(target) else {
            self.waits.retain(|w| w.waiter != caller);
            return Ok(true);
        };
        if caller == target {
            return Ok(true);
        }
        if target_record.state == ActorState::Exited {
            return Err(SchedulerError::Exited(target_record.name.clone()));
        }

        let target_key = (target_record.clock, target_record.seq);
        if target_key >= caller_key {
            self.waits.retain(|w| w.waiter != caller);
            return Ok(true);
        }

        let limit = self.config.retry_limit;
        let progress = self.progress;
        let mut stalled = None;
        match self.waits.iter_mut().find(|w| w.waiter == caller) {
            Some(wait) if wait.target == target => {
                if wait.observe(target_key.0, progress, limit) {
                    stalled = Some(*wait);
                }
            }
            Some(wait) => *wait = Wait::new(caller, target, target_key.0, progress),
            None => self
                .waits
                .push(Wait::new(caller, target, target_key.0, progress)),
        }
        if let Some(wait) = stalled {
            return Err(self.deadlock(wait));
        }

        self.record_mut(caller)?.state = ActorState::Waiting;
        self.transfer = Some(Transfer::Switch(target));
        Ok(false)
    }

    fn deadlock(&self, wait: Wait) -> SchedulerError {
        let name = |id: ActorId| {
            self.record(id)
                .map(|record| record.name.clone())
                .unwrap_or_else(|_| id.to_string())
        };
        let waiter = name(wait.waiter);
        let target = name(wait.target);
        warn!(%waiter, %target, stalls = wait.stalls, "actor rendezvous deadlocked");
        SchedulerError::Deadlock {
            waiter,
            target,
            stalls: wait.stalls,
        }
    }

    pub(crate) fn request_exit(&mut self, id: ActorId, reason: ExitReason, payload: Option<u64>) {
        self.transfer = Some(Transfer::Exit(Event {
            reason,
            actor: id,
            payload,
        }));
    }

    /// Marks `id` parked if the scheduler is quiescing. Returns whether the caller must suspend.
    pub(crate) fn park(&mut self, id: ActorId) -> bool {
        if self.mode != Mode::Quiesce {
            return false;
        }
        if let Ok(record) = self.record_mut(id) {
            record.parked = true;
        }
        self.request_exit(id, ExitReason::Synchronize, None);
        true
    }

    pub(crate) fn synchronizing(&self, id: ActorId) -> bool {
        self.waits.iter().any(|w| w.target == id)
    }

    pub(crate) fn quiescing(&self) -> bool {
        self.mode == Mode::Quiesce
    }

    /// Marks `id` running before its fiber is resumed.
    pub(crate) fn begin_slice(&mut self, id: ActorId) -> Result<()> {
        let record = self.record_mut(id)?;
        if record.state == ActorState::Exited {
            return Err(SchedulerError::Exited(record.name.clone()));
        }
        record.state = ActorState::Running;
        self.quiesced = false;
        Ok(())
    }

    /// Applies the transfer `id` requested when it suspended. Returns the exit event if control
    /// goes back to the host.
    pub(crate) fn end_slice(&mut self, id: ActorId) -> Result<Option<Event>> {
        match self.transfer.take() {
            Some(Transfer::Switch(target)) => {
                trace!(from = %id, to = %target, "switch");
                self.current = Some(target);
                Ok(None)
            }
            Some(Transfer::Exit(event)) => {
                let record = self.record_mut(id)?;
                if record.state == ActorState::Running {
                    record.state = ActorState::Idle;
                }
                self.last_event = Some(event);
                Ok(Some(event))
            }
            None => Err(SchedulerError::StrayYield(self.record(id)?.name.clone())),
        }
    }

    pub(crate) fn mark_exited(&mut self, id: ActorId) {
        if let Ok(record) = self.record_mut(id) {
            record.state = ActorState::Exited;
        }
        self.waits.retain(|w| w.waiter != id);
        self.transfer = None;
    }

    pub(crate) fn begin_quiesce(&mut self) {
        self.mode = Mode::Quiesce;
        for slot in &mut self.slots {
            if let Some(record) = slot.record.as_mut() {
                record.parked = false;
            }
        }
    }

    pub(crate) fn is_parked(&self, id: ActorId) -> bool {
        self.record(id).map(|record| record.parked).unwrap_or(false)
    }

    /// Leaves quiesce mode. On success every actor is parked and nobody waits on anybody, so
    /// the primary actor resumes first, exactly as it would after restoring a snapshot.
    pub(crate) fn end_quiesce(&mut self, parked: bool) {
        self.mode = Mode::Run;
        self.transfer = None;
        if parked {
            self.waits.clear();
            for slot in &mut self.slots {
                if let Some(record) = slot.record.as_mut() {
                    if record.state != ActorState::Exited {
                        record.state = ActorState::Idle;
                    }
                }
            }
            self.current = self.primary;
        }
        self.quiesced = parked;
    }

    /// Forgets every continuation-related bit of state ahead of restarting all fibers.
    /// Clocks are left alone.
    pub(crate) fn restart(&mut self) {
        for slot in &mut self.slots {
            if let Some(record) = slot.record.as_mut() {
                record.state = ActorState::Idle;
                record.parked = false;
            }
        }
        self.waits.clear();
        self.transfer = None;
        self.mode = Mode::Run;
        self.current = self.primary;
        self.quiesced = false;
    }

    pub(crate) fn power(&mut self) {
        self.restart();
        for slot in &mut self.slots {
            if let Some(record) = slot.record.as_mut() {
                record.clock = 0;
                record.fraction = 0;
            }
        }
        self.last_event = None;
    }
}
