use crate::actor::ActorId;

/// Why control came back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// One unit of work finished (an instruction, a scanline) and the host asked to see it.
    Step,
    /// An actor reached its safe point while the scheduler was quiescing.
    Synchronize,
    /// A video frame is complete.
    Frame,
    /// An audio buffer is ready.
    Audio,
    /// Host-defined; the meaning travels in [`Event::payload`].
    UserEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub reason: ExitReason,
    /// Actor that requested the exit.
    pub actor: ActorId,
    pub payload: Option<u64>,
}
