//! Bounded polling primitive shared by every poll kind.
//!
//! A [`Poller`] invokes its action once per tick of a fixed-period timer and
//! feeds each result to `on_tick` and `is_done`. Action futures are not
//! awaited before the next tick is due, so results of successive attempts may
//! overlap and arrive out of order; hooks must tolerate that.
//!
//! Lifecycle: `Idle -> Running -> {Completed | TimedOut | Cancelled}`. Exactly
//! one terminal transition wins. The hook tied to that transition
//! (`on_complete`, `on_timeout`) runs at most once, and no hook runs after a
//! terminal state has been reached.

mod slot;

use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt as _};
use futures::StreamExt as _;
use futures::stream::FuturesUnordered;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

pub use slot::PollSlot;

/// The independent poll kinds; each owns at most one live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    Generation,
    Execution,
    ListRefresh,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Execution => "execution",
            Self::ListRefresh => "list_refresh",
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generation => "test generation",
            Self::Execution => "test execution",
            Self::ListRefresh => "session list refresh",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Cancelled)
    }
}

/// Timing and budget for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    /// `None` polls until cancelled.
    pub max_attempts: Option<u32>,
}

impl PollSpec {
    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Total time budget (`interval * max_attempts`), if bounded.
    pub fn budget(&self) -> Option<Duration> {
        self.max_attempts.map(|n| self.interval.saturating_mul(n))
    }
}

type Action<T> = Box<dyn FnMut() -> BoxFuture<'static, T> + Send>;
type DonePredicate<T> = Box<dyn Fn(&T) -> bool + Send>;
type TickHook<T> = Box<dyn FnMut(&T) -> ControlFlow<()> + Send>;
type CompleteHook<T> = Box<dyn FnOnce(T) + Send>;
type TimeoutHook = Box<dyn FnOnce() + Send>;

/// Builder for one poll. Nothing runs until [`Poller::start`].
pub struct Poller<T> {
    kind: PollKind,
    spec: PollSpec,
    generation: u64,
    action: Action<T>,
    is_done: DonePredicate<T>,
    on_tick: TickHook<T>,
    on_complete: CompleteHook<T>,
    on_timeout: TimeoutHook,
}

impl<T: Send + 'static> Poller<T> {
    pub fn new<F, Fut>(kind: PollKind, spec: PollSpec, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            kind,
            spec,
            generation: 0,
            action: Box::new(move || action().boxed()),
            is_done: Box::new(|_| false),
            on_tick: Box::new(|_| ControlFlow::Continue(())),
            on_complete: Box::new(|_| {}),
            on_timeout: Box::new(|| {}),
        }
    }

    /// Generation token recorded on the handle (see [`PollSlot`]).
    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn is_done(mut self, predicate: impl Fn(&T) -> bool + Send + 'static) -> Self {
        self.is_done = Box::new(predicate);
        self
    }

    /// Runs for every result before `is_done` is checked. Returning
    /// `ControlFlow::Break` stops the poll as `Cancelled`.
    pub fn on_tick(mut self, hook: impl FnMut(&T) -> ControlFlow<()> + Send + 'static) -> Self {
        self.on_tick = Box::new(hook);
        self
    }

    pub fn on_complete(mut self, hook: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_complete = Box::new(hook);
        self
    }

    pub fn on_timeout(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_timeout = Box::new(hook);
        self
    }

    /// Spawns the timer task and returns its handle. The first tick fires one
    /// interval after start.
    pub fn start(self) -> PollHandle {
        let (state_tx, _) = watch::channel(PollState::Idle);
        let state = Arc::new(state_tx);
        let attempts = Arc::new(AtomicU32::new(0));
        let kind = self.kind;
        let spec = self.spec;
        let generation = self.generation;
        state.send_replace(PollState::Running);
        info!(
            event = "poll.started",
            domain = "poll",
            kind = kind.as_str(),
            generation,
            interval_ms = spec.interval.as_millis() as u64,
            max_attempts = ?spec.max_attempts
        );
        let task = tokio::spawn(drive(self, state.clone(), attempts.clone()));
        PollHandle {
            kind,
            spec,
            generation,
            state,
            attempts,
            task,
        }
    }
}

/// Owning handle of a running poll. Dropping it cancels the poll.
pub struct PollHandle {
    kind: PollKind,
    spec: PollSpec,
    generation: u64,
    state: Arc<watch::Sender<PollState>>,
    attempts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn kind(&self) -> PollKind {
        self.kind
    }

    pub fn spec(&self) -> PollSpec {
        self.spec
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Cancels the poll unless it already reached a terminal state. Returns
    /// true when this call performed the transition.
    ///
    /// Stops future ticks; results still in flight are dropped.
    pub fn cancel(&self) -> bool {
        if !settle(&self.state, PollState::Cancelled) {
            return false;
        }
        self.task.abort();
        info!(
            event = "poll.cancelled",
            domain = "poll",
            kind = self.kind.as_str(),
            generation = self.generation,
            attempts = self.attempts()
        );
        true
    }

    /// Waits for the terminal state.
    pub async fn wait(&self) -> PollState {
        wait_terminal(self.subscribe()).await
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

pub(crate) async fn wait_terminal(mut rx: watch::Receiver<PollState>) -> PollState {
    match rx.wait_for(|state| state.is_terminal()).await {
        Ok(state) => *state,
        Err(_) => PollState::Cancelled,
    }
}

/// Moves a non-terminal state to `to`. Only the first terminal transition wins.
fn settle(state: &watch::Sender<PollState>, to: PollState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = to;
            true
        }
    })
}

struct Hooks<T> {
    kind: PollKind,
    generation: u64,
    state: Arc<watch::Sender<PollState>>,
    is_done: DonePredicate<T>,
    on_tick: TickHook<T>,
    on_complete: Option<CompleteHook<T>>,
    on_timeout: Option<TimeoutHook>,
}

impl<T> Hooks<T> {
    /// Applies one result. Returns true once the poll is terminal.
    fn apply(&mut self, result: T) -> bool {
        if self.state.borrow().is_terminal() {
            return true;
        }
        if (self.on_tick)(&result).is_break() {
            if settle(&self.state, PollState::Cancelled) {
                info!(
                    event = "poll.stopped",
                    domain = "poll",
                    kind = self.kind.as_str(),
                    generation = self.generation
                );
            }
            return true;
        }
        if !(self.is_done)(&result) {
            return false;
        }
        if settle(&self.state, PollState::Completed) {
            info!(
                event = "poll.completed",
                domain = "poll",
                kind = self.kind.as_str(),
                generation = self.generation
            );
            if let Some(hook) = self.on_complete.take() {
                hook(result);
            }
        }
        true
    }

    fn time_out(&mut self, attempts: u32) {
        if settle(&self.state, PollState::TimedOut) {
            info!(
                event = "poll.timed_out",
                domain = "poll",
                kind = self.kind.as_str(),
                generation = self.generation,
                attempts
            );
            if let Some(hook) = self.on_timeout.take() {
                hook();
            }
        }
    }
}

async fn drive<T: Send + 'static>(
    poller: Poller<T>,
    state: Arc<watch::Sender<PollState>>,
    attempts: Arc<AtomicU32>,
) {
    let Poller {
        kind,
        spec,
        generation,
        mut action,
        is_done,
        on_tick,
        on_complete,
        on_timeout,
    } = poller;
    let mut hooks = Hooks {
        kind,
        generation,
        state,
        is_done,
        on_tick,
        on_complete: Some(on_complete),
        on_timeout: Some(on_timeout),
    };

    let mut ticker = tokio::time::interval_at(Instant::now() + spec.interval, spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;
            Some(result) = in_flight.next() => {
                if hooks.apply(result) {
                    return;
                }
            }
            _ = ticker.tick() => {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    event = "poll.tick",
                    domain = "poll",
                    kind = kind.as_str(),
                    generation,
                    attempt,
                    in_flight = in_flight.len() as u64
                );
                in_flight.push(action());
                if spec.max_attempts.is_some_and(|max| attempt >= max) {
                    break;
                }
            }
        }
    }

    // The timer is stopped. Results still in flight get one more interval to
    // land before the poll times out.
    let drain = tokio::time::sleep(spec.interval);
    tokio::pin!(drain);
    while !in_flight.is_empty() {
        tokio::select! {
            biased;
            Some(result) = in_flight.next() => {
                if hooks.apply(result) {
                    return;
                }
            }
            _ = &mut drain => break,
        }
    }
    hooks.time_out(attempts.load(Ordering::SeqCst));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn completes_when_predicate_holds() {
        let calls = counter();
        let completed = Arc::new(Mutex::new(None));
        let action_calls = calls.clone();
        let completed_slot = completed.clone();
        let handle = Poller::new(PollKind::Generation, PollSpec::bounded(Duration::from_secs(5), 10), move || {
            let n = action_calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { n }
        })
        .is_done(|n: &u32| *n >= 3)
        .on_complete(move |n| *completed_slot.lock().unwrap() = Some(n))
        .start();

        assert_eq!(handle.state(), PollState::Running);
        assert_eq!(handle.wait().await, PollState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.attempts(), 3);
        assert_eq!(*completed.lock().unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_attempts() {
        let calls = counter();
        let timed_out = counter();
        let action_calls = calls.clone();
        let timeouts = timed_out.clone();
        let handle = Poller::new(PollKind::Execution, PollSpec::bounded(Duration::from_secs(5), 4), move || {
            action_calls.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .on_timeout(move || {
            timeouts.fetch_add(1, Ordering::SeqCst);
        })
        .start();

        let started = Instant::now();
        assert_eq!(handle.wait().await, PollState::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(timed_out.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_secs(20));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_interval() {
        let calls = counter();
        let action_calls = calls.clone();
        let _handle = Poller::new(PollKind::ListRefresh, PollSpec::unbounded(Duration::from_secs(5)), move || {
            action_calls.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .start();

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticks_and_suppresses_hooks() {
        let calls = counter();
        let hooks_run = counter();
        let action_calls = calls.clone();
        let on_timeout = hooks_run.clone();
        let handle = Poller::new(PollKind::Generation, PollSpec::bounded(Duration::from_secs(5), 3), move || {
            action_calls.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .on_timeout(move || {
            on_timeout.fetch_add(1, Ordering::SeqCst);
        })
        .start();

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.state(), PollState::Cancelled);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hooks_run.load(Ordering::SeqCst), 0);
        assert_eq!(handle.wait().await, PollState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn break_from_on_tick_cancels() {
        let calls = counter();
        let action_calls = calls.clone();
        let handle = Poller::new(PollKind::Execution, PollSpec::bounded(Duration::from_secs(5), 10), move || {
            let n = action_calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { n }
        })
        .on_tick(|n: &u32| {
            if *n == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .start();

        assert_eq!(handle.wait().await, PollState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_slow_results_are_tolerated() {
        // Each action takes 12s while the period is 5s, so attempts overlap.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = counter();
        let action_calls = calls.clone();
        let tick_log = seen.clone();
        let handle = Poller::new(PollKind::Generation, PollSpec::bounded(Duration::from_secs(5), 6), move || {
            let n = action_calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_secs(12)).await;
                n
            }
        })
        .on_tick(move |n: &u32| {
            tick_log.lock().unwrap().push(*n);
            ControlFlow::Continue(())
        })
        .is_done(|n: &u32| *n == 2)
        .start();

        assert_eq!(handle.wait().await, PollState::Completed);
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(seen.lock().unwrap().as_slice(), &[1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn final_attempt_result_lands_during_drain() {
        let handle = Poller::new(PollKind::Generation, PollSpec::bounded(Duration::from_secs(5), 1), || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            true
        })
        .is_done(|done: &bool| *done)
        .start();

        assert_eq!(handle.wait().await, PollState::Completed);
        assert_eq!(handle.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_attempts_time_out_one_interval_after_the_last_tick() {
        let handle = Poller::new(PollKind::Execution, PollSpec::bounded(Duration::from_secs(5), 4), || {
            std::future::pending::<bool>()
        })
        .is_done(|done: &bool| *done)
        .start();

        let started = Instant::now();
        assert_eq!(handle.wait().await, PollState::TimedOut);
        assert_eq!(handle.attempts(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(25));
        assert!(elapsed < Duration::from_secs(26));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let calls = counter();
        let action_calls = calls.clone();
        let handle = Poller::new(PollKind::ListRefresh, PollSpec::unbounded(Duration::from_secs(5)), move || {
            action_calls.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .start();
        let rx = handle.subscribe();
        drop(handle);

        assert_eq!(wait_terminal(rx).await, PollState::Cancelled);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn spec_budget() {
        assert_eq!(
            PollSpec::bounded(Duration::from_secs(5), 36).budget(),
            Some(Duration::from_secs(180))
        );
        assert_eq!(PollSpec::unbounded(Duration::from_secs(5)).budget(), None);
    }
}
