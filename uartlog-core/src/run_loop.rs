//! Cooperative single-threaded run loop
//!
//! The run loop is the environment the transport core runs in. It offers two
//! kinds of suspension points:
//!
//! - **Timers**: one-shot, zero or relative delay, removable.
//! - **Readiness signals**: edge-triggered notifications raised by I/O. A
//!   signal only queues a wakeup while armed, and firing disarms it, so each
//!   arm yields at most one wakeup.
//!
//! The loop never calls back into its owner. The owner pulls [`Wakeup`]s with
//! [`RunLoop::next_wakeup`] and dispatches them itself, which keeps all state
//! mutation on the owner's thread without callbacks or locks.
//!
//! Readiness signals are the only part that may be touched from another
//! thread (a tokio reactor waking an I/O waker); firing one merely queues the
//! source id and notifies [`RunLoop::wait`].

use futures::task::{waker, ArcWake};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Handle of a registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Identifier of a readiness source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u32);

/// Something the owner of the run loop has to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A timer expired (it is no longer registered)
    Timer(TimerId),
    /// A readiness signal fired
    Ready(SourceId),
}

#[derive(Debug, Default)]
struct ReadyQueue {
    pending: Mutex<VecDeque<SourceId>>,
    notify: Notify,
}

impl ReadyQueue {
    fn push(&self, source: SourceId) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(source);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<SourceId> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

struct SignalInner {
    source: SourceId,
    armed: AtomicBool,
    queue: Arc<ReadyQueue>,
}

impl SignalInner {
    fn fire(&self) -> bool {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.queue.push(self.source);
            true
        } else {
            false
        }
    }
}

impl ArcWake for SignalInner {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.fire();
    }
}

/// Edge-triggered readiness signal
///
/// Cloning yields another handle to the same signal.
#[derive(Clone)]
pub struct ReadySignal {
    inner: Arc<SignalInner>,
}

impl ReadySignal {
    /// Source id reported in [`Wakeup::Ready`]
    pub fn source(&self) -> SourceId {
        self.inner.source
    }

    /// Register interest: the next `fire` will queue a wakeup
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::Release);
    }

    /// Withdraw interest without queuing anything
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::Release);
    }

    /// Check if the signal is armed
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    /// Raise the signal
    ///
    /// # Returns
    /// `true` if a wakeup was queued, `false` if the signal was not armed
    pub fn fire(&self) -> bool {
        self.inner.fire()
    }

    /// A task waker that fires this signal when woken
    ///
    /// Used to hook tokio's I/O readiness into the run loop: a port polled
    /// with this waker fires the signal once it becomes ready.
    pub fn waker(&self) -> Waker {
        waker(self.inner.clone())
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("source", &self.inner.source)
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    System,
    Manual(Instant),
}

/// Cooperative run loop with a timer queue and readiness signals
#[derive(Debug)]
pub struct RunLoop {
    clock: Clock,
    timers: BTreeSet<(Instant, TimerId)>,
    deadlines: HashMap<TimerId, Instant>,
    next_timer: u64,
    next_source: u32,
    ready: Arc<ReadyQueue>,
}

impl RunLoop {
    /// Create a run loop driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    /// Create a run loop whose clock only moves through [`RunLoop::advance`]
    ///
    /// Useful for stepping the loop deterministically.
    pub fn with_manual_clock() -> Self {
        Self::with_clock(Clock::Manual(Instant::now()))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            timers: BTreeSet::new(),
            deadlines: HashMap::new(),
            next_timer: 0,
            next_source: 0,
            ready: Arc::new(ReadyQueue::default()),
        }
    }

    /// Current time of the loop's clock
    pub fn now(&self) -> Instant {
        match self.clock {
            Clock::System => Instant::now(),
            Clock::Manual(now) => now,
        }
    }

    /// Check if the loop uses a manual clock
    pub fn is_manual(&self) -> bool {
        matches!(self.clock, Clock::Manual(_))
    }

    /// Move a manual clock forward
    ///
    /// Has no effect on a system clock.
    pub fn advance(&mut self, duration: Duration) {
        match &mut self.clock {
            Clock::Manual(now) => *now += duration,
            Clock::System => log::warn!("run loop: advance() ignored on system clock"),
        }
    }

    /// Register a one-shot timer expiring `delay` from now
    pub fn add_timer(&mut self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        let deadline = self.now() + delay;
        self.timers.insert((deadline, id));
        self.deadlines.insert(id, deadline);
        id
    }

    /// Remove a pending timer
    ///
    /// # Returns
    /// `true` if the timer was still pending
    pub fn remove_timer(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.timers.remove(&(deadline, id)),
            None => false,
        }
    }

    /// Check if a timer is still pending
    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Number of pending timers
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Time left until the earliest pending timer expires
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        let now = self.now();
        self.timers
            .first()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
    }

    /// Create a new readiness signal (initially disarmed)
    pub fn signal(&mut self) -> ReadySignal {
        let source = SourceId(self.next_source);
        self.next_source += 1;
        ReadySignal {
            inner: Arc::new(SignalInner {
                source,
                armed: AtomicBool::new(false),
                queue: self.ready.clone(),
            }),
        }
    }

    /// Pop the next thing to handle
    ///
    /// Fired readiness signals come first, in firing order, then expired
    /// timers in deadline order. Returns `None` when nothing is due.
    pub fn next_wakeup(&mut self) -> Option<Wakeup> {
        if let Some(source) = self.ready.pop() {
            return Some(Wakeup::Ready(source));
        }

        let now = self.now();
        let &(deadline, id) = self.timers.first()?;
        if deadline > now {
            return None;
        }
        self.timers.remove(&(deadline, id));
        self.deadlines.remove(&id);
        Some(Wakeup::Timer(id))
    }

    /// Check if a wakeup is due right now
    pub fn has_due_wakeup(&self) -> bool {
        if !self.ready.is_empty() {
            return true;
        }
        let now = self.now();
        self.timers
            .first()
            .is_some_and(|(deadline, _)| *deadline <= now)
    }

    /// Wait until a signal fires or the earliest timer expires
    ///
    /// Returns immediately if something is already due. With a manual clock
    /// only signals can end the wait early; timers are waited for in real
    /// time relative to the manual clock's current reading.
    pub async fn wait(&self) {
        if self.has_due_wakeup() {
            return;
        }
        match self.time_until_next_timer() {
            Some(delay) => {
                tokio::select! {
                    _ = self.ready.notify.notified() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => self.ready.notify.notified().await,
        }
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}
