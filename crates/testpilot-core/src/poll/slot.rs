use tokio::sync::watch;

use super::{PollHandle, PollKind, PollState};

/// Holds the single live poll of one kind.
///
/// Every [`PollSlot::begin`] bumps the generation and cancels the previous
/// handle, so at most one poll per kind is ever live. Hooks capture the
/// generation they were started under and check [`PollSlot::is_current`]
/// before touching shared state; results that land after a newer run began
/// (or after cancellation) are discarded that way.
#[derive(Debug)]
pub struct PollSlot {
    kind: PollKind,
    generation: u64,
    current: Option<PollHandle>,
}

impl PollSlot {
    pub fn new(kind: PollKind) -> Self {
        Self {
            kind,
            generation: 0,
            current: None,
        }
    }

    pub fn kind(&self) -> PollKind {
        self.kind
    }

    /// Cancels the live poll (if any) and returns the generation for the run
    /// that replaces it.
    pub fn begin(&mut self) -> u64 {
        self.cancel_current();
        self.generation += 1;
        self.generation
    }

    /// Stores `handle` if `generation` is still current; otherwise the handle
    /// is dropped, which cancels it.
    pub fn install(&mut self, generation: u64, handle: PollHandle) -> bool {
        if generation != self.generation {
            handle.cancel();
            return false;
        }
        self.cancel_current();
        self.current = Some(handle);
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancels the live poll and invalidates its generation.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.cancel_current()
    }

    /// `Idle` until a poll has been installed.
    pub fn state(&self) -> PollState {
        self.current
            .as_ref()
            .map_or(PollState::Idle, PollHandle::state)
    }

    pub fn handle(&self) -> Option<&PollHandle> {
        self.current.as_ref()
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<PollState>> {
        self.current.as_ref().map(PollHandle::subscribe)
    }

    fn cancel_current(&mut self) -> bool {
        self.current.take().is_some_and(|handle| handle.cancel())
    }
}
