//! The execution substrate: a cooperative or background-threaded event
//! loop that drives dispatch turns and timer promises.
//!
//! By default the reactor is single-threaded and cooperative: all promise
//! resolution, dispatch, and pipelining bookkeeping run on whichever
//! thread drives the loop through a blocking [`crate::Promise::wait`].
//! [`Reactor::enter_threaded`] instead dedicates a background thread to
//! the pump, so arbitrary calling threads may enqueue calls and block on
//! `wait` concurrently; resolutions then cross threads through the
//! promise's own handoff.
//!
//! Exactly one reactor may be active per process at a time. The active
//! slot is an explicit ownership token claimed by [`Reactor::enter`] and
//! released by [`Reactor::teardown`] (or drop); entering while one is
//! active is a usage error, not a silent share.

use crate::error::{Error, Result};
use crate::promise::{pair_on, Fulfiller, Promise};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Upper bound on a single park, so the pump rechecks liveness and newly
/// injected work even without an explicit wake.
const MAX_PARK: Duration = Duration::from_millis(10);

static REACTOR_ACTIVE: AtomicBool = AtomicBool::new(false);

type Turn = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    deadline: Instant,
    /// Distinguishes entries with equal deadlines; earlier insertions fire
    /// first.
    generation: u64,
    fulfiller: Fulfiller<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    fn insert(&mut self, deadline: Instant, fulfiller: Fulfiller<()>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            fulfiller,
        });
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    fn pop_expired(&mut self, now: Instant) -> Vec<Fulfiller<()>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.fulfiller);
            }
        }
        expired
    }
}

struct ReactorShared {
    injector: SegQueue<Turn>,
    timers: Mutex<TimerHeap>,
    park_lock: Mutex<()>,
    park_cond: Condvar,
    threaded: bool,
    alive: AtomicBool,
}

/// A cheap, thread-safe handle to the reactor: clients and promises hold
/// one to enqueue dispatch turns and drive or await the pump.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<ReactorShared>,
}

impl ReactorHandle {
    /// Returns true if a dedicated background thread owns the pump.
    #[must_use]
    pub fn is_threaded(&self) -> bool {
        self.shared.threaded
    }

    /// Enqueues a dispatch turn and wakes the pump.
    pub(crate) fn enqueue(&self, turn: impl FnOnce() + Send + 'static) {
        self.shared.injector.push(Box::new(turn));
        self.shared.park_cond.notify_all();
    }

    /// Runs one unit of ready work. Returns false if there was nothing to
    /// do (no queued turn, no expired timer).
    pub(crate) fn pump_one(&self) -> bool {
        if let Some(turn) = self.shared.injector.pop() {
            turn();
            return true;
        }
        let expired = self.shared.timers.lock().pop_expired(Instant::now());
        if expired.is_empty() {
            return false;
        }
        tracing::trace!(count = expired.len(), "firing timer promises");
        for fulfiller in expired {
            fulfiller.fulfill(());
        }
        true
    }

    /// Parks the current thread until new work arrives, the next timer
    /// deadline, or a short bounded interval, whichever is soonest.
    pub(crate) fn park(&self) {
        let mut guard = self.shared.park_lock.lock();
        if !self.shared.injector.is_empty() {
            return;
        }
        let timeout = self
            .shared
            .timers
            .lock()
            .next_deadline()
            .map_or(MAX_PARK, |deadline| {
                deadline.saturating_duration_since(Instant::now()).min(MAX_PARK)
            });
        self.shared.park_cond.wait_for(&mut guard, timeout);
    }

    /// Returns a promise that resolves once `delay` has elapsed. The
    /// promise is cancellable like any other; a fired timer whose promise
    /// was cancelled is discarded.
    #[must_use]
    pub fn after_delay(&self, delay: Duration) -> Promise<()> {
        let (promise, fulfiller) = pair_on::<()>(self.clone());
        self.shared
            .timers
            .lock()
            .insert(Instant::now() + delay, fulfiller);
        // The pump may be parked past the new, earlier deadline.
        self.shared.park_cond.notify_all();
        promise
    }
}

/// Timer surface of the reactor.
#[derive(Clone)]
pub struct Timer {
    handle: ReactorHandle,
}

impl Timer {
    /// Returns a promise that resolves after `delay`.
    #[must_use]
    pub fn after_delay(&self, delay: Duration) -> Promise<()> {
        self.handle.after_delay(delay)
    }
}

/// The owned reactor instance: the process-wide ownership token plus, in
/// threaded mode, the pump thread.
pub struct Reactor {
    handle: ReactorHandle,
    pump: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Claims the process-wide reactor slot in cooperative mode: the loop
    /// runs on whichever thread blocks in `wait`.
    pub fn enter() -> Result<Self> {
        Self::claim(false)
    }

    /// Claims the process-wide reactor slot in threaded mode: a dedicated
    /// background thread owns the pump.
    pub fn enter_threaded() -> Result<Self> {
        Self::claim(true)
    }

    fn claim(threaded: bool) -> Result<Self> {
        if REACTOR_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::reactor_active());
        }
        let handle = ReactorHandle {
            shared: Arc::new(ReactorShared {
                injector: SegQueue::new(),
                timers: Mutex::new(TimerHeap::default()),
                park_lock: Mutex::new(()),
                park_cond: Condvar::new(),
                threaded,
                alive: AtomicBool::new(true),
            }),
        };
        tracing::debug!(threaded, "reactor entered");
        let pump = if threaded {
            let pump_handle = handle.clone();
            let spawned = std::thread::Builder::new()
                .name("capwire-reactor".into())
                .spawn(move || {
                    while pump_handle.shared.alive.load(Ordering::Acquire) {
                        if !pump_handle.pump_one() {
                            pump_handle.park();
                        }
                    }
                });
            match spawned {
                Ok(join) => Some(join),
                Err(e) => {
                    REACTOR_ACTIVE.store(false, Ordering::Release);
                    return Err(Error::internal(format!(
                        "failed to spawn reactor thread: {e}"
                    )));
                }
            }
        } else {
            None
        };
        Ok(Self { handle, pump })
    }

    /// Returns the handle for enqueuing work and awaiting promises; clone
    /// it to keep one past the reactor's lifetime.
    #[must_use]
    pub fn handle(&self) -> &ReactorHandle {
        &self.handle
    }

    /// Returns the timer surface.
    #[must_use]
    pub fn timer(&self) -> Timer {
        Timer {
            handle: self.handle.clone(),
        }
    }

    /// Tears the reactor down, releasing the process-wide slot so a new
    /// reactor may be entered. Equivalent to dropping.
    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.handle.shared.alive.store(false, Ordering::Release);
        self.handle.shared.park_cond.notify_all();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
        tracing::debug!("reactor torn down");
        REACTOR_ACTIVE.store(false, Ordering::Release);
    }
}

impl core::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reactor")
            .field("threaded", &self.handle.is_threaded())
            .finish()
    }
}

impl core::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("threaded", &self.is_threaded())
            .finish()
    }
}
