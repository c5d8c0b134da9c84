//! Single-resolution promises with chained continuations.
//!
//! A [`Promise`] is an explicit state machine:
//!
//! ```text
//! Pending → Settled(Ok | Err) → Consumed
//!        ↘ Cancelled
//! ```
//!
//! Resolution is a thread-safe single assignment: whichever thread
//! transitions the state runs the queued continuation, under a lock held
//! only for the transition itself. A promise is consumed exactly once by a
//! terminal operation — a blocking [`Promise::wait`], or being chained
//! into a dependent promise via [`Promise::then`] (move semantics make a
//! second chain a compile error). Consuming a cancelled promise fails with
//! the "already consumed" condition; it is not restartable.
//!
//! Cancellation is cooperative and non-blocking: a pending promise
//! transitions to `Cancelled` immediately for local observers, and any
//! result delivered afterwards is discarded rather than reported.

use crate::error::{Error, Result};
use crate::reactor::ReactorHandle;
use core::fmt;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

/// How long a blocked `wait` sleeps between state re-checks when it has no
/// cooperative reactor to drive.
const HANDOFF_POLL: Duration = Duration::from_millis(20);

type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send>;

enum State<T> {
    Pending { continuation: Option<Continuation<T>> },
    Settled(Result<T>),
    Cancelled,
    Consumed,
}

impl<T> State<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "Pending",
            Self::Settled(Ok(_)) => "Fulfilled",
            Self::Settled(Err(_)) => "Rejected",
            Self::Cancelled => "Cancelled",
            Self::Consumed => "Consumed",
        }
    }
}

pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

impl<T: Send + 'static> Shared<T> {
    fn new_pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending { continuation: None }),
            settled: Condvar::new(),
        })
    }

    /// Delivers the terminal result. First terminal state wins; anything
    /// arriving after cancellation or settlement is discarded.
    fn settle(&self, result: Result<T>) {
        let run = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, State::Consumed) {
                State::Pending {
                    continuation: Some(cont),
                } => Some((cont, result)),
                State::Pending { continuation: None } => {
                    *state = State::Settled(result);
                    self.settled.notify_all();
                    None
                }
                other => {
                    // Already cancelled, settled, or consumed: late result
                    // is discarded, not reported.
                    *state = other;
                    None
                }
            }
        };
        if let Some((cont, result)) = run {
            cont(result);
        }
    }
}

/// A single-resolution promise for a value of type `T`.
///
/// `Promise<()>` (see [`VoidPromise`]) is the side-effect-only variant;
/// its continuations take no value argument via [`Promise::then_void`].
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    reactor: Option<ReactorHandle>,
}

/// The resolving half of a promise pair.
///
/// Dropping a fulfiller without resolving leaves the promise pending
/// forever; the dispatcher always settles every slot it creates.
pub struct Fulfiller<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a promise together with its fulfiller.
#[must_use]
pub fn pair<T: Send + 'static>() -> (Promise<T>, Fulfiller<T>) {
    let shared = Shared::new_pending();
    (
        Promise {
            shared: shared.clone(),
            reactor: None,
        },
        Fulfiller { shared },
    )
}

/// Creates a promise pair whose `wait` drives the given reactor when it is
/// cooperative.
pub(crate) fn pair_on<T: Send + 'static>(reactor: ReactorHandle) -> (Promise<T>, Fulfiller<T>) {
    let (promise, fulfiller) = pair();
    (promise.with_reactor(reactor), fulfiller)
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an already-fulfilled promise.
    #[must_use]
    pub fn fulfilled(value: T) -> Self {
        let (promise, fulfiller) = pair();
        fulfiller.fulfill(value);
        promise
    }

    /// Creates an already-rejected promise.
    #[must_use]
    pub fn rejected(error: Error) -> Self {
        let (promise, fulfiller) = pair();
        fulfiller.reject(error);
        promise
    }

    /// Associates a reactor so `wait` can drive the cooperative loop.
    #[must_use]
    pub(crate) fn with_reactor(mut self, reactor: ReactorHandle) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Consumes the promise, running `op` once it settles. Now if it is
    /// already settled, otherwise on whichever thread delivers the result.
    /// A cancelled promise delivers the "already consumed" rejection.
    pub(crate) fn on_settle(self, op: impl FnOnce(Result<T>) + Send + 'static) {
        let mut state = self.shared.state.lock();
        match &mut *state {
            State::Pending { continuation } => {
                *continuation = Some(Box::new(op));
            }
            State::Settled(_) => {
                let State::Settled(result) = mem::replace(&mut *state, State::Consumed) else {
                    unreachable!("matched Settled above");
                };
                drop(state);
                op(result);
            }
            State::Cancelled | State::Consumed => {
                drop(state);
                op(Err(Error::already_consumed()));
            }
        }
    }

    fn chain<U: Send + 'static>(
        self,
        op: impl FnOnce(Result<T>, Fulfiller<U>) + Send + 'static,
    ) -> Promise<U> {
        let (mut next, fulfiller) = pair::<U>();
        next.reactor = self.reactor.clone();
        self.on_settle(move |result| op(result, fulfiller));
        next
    }

    /// Attaches a fulfillment continuation, returning the dependent
    /// promise. Rejection passes through untouched.
    pub fn then<U, F>(self, op: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.chain(move |result, fulfiller| match result {
            Ok(value) => fulfiller.resolve(op(value)),
            Err(e) => fulfiller.reject(e),
        })
    }

    /// Attaches fulfillment and rejection continuations. If the rejection
    /// handler itself fails, its error becomes the rejection of the
    /// dependent promise.
    pub fn then_catch<U, F, G>(self, op: F, on_err: G) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
        G: FnOnce(Error) -> Result<U> + Send + 'static,
    {
        self.chain(move |result, fulfiller| match result {
            Ok(value) => fulfiller.resolve(op(value)),
            Err(e) => fulfiller.resolve(on_err(e)),
        })
    }

    /// Attaches a continuation that itself returns a promise; the
    /// dependent promise resolves to the inner promise's resolution.
    pub fn then_promise<U, F>(self, op: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(move |result, fulfiller| match result {
            Ok(value) => op(value).on_settle(move |inner| fulfiller.resolve(inner)),
            Err(e) => fulfiller.reject(e),
        })
    }

    /// Blocks until the promise settles, driving the cooperative reactor
    /// if this promise is bound to one.
    ///
    /// Fails with the "already consumed" condition if the promise was
    /// cancelled (or already consumed through another handle).
    pub fn wait(self) -> Result<T> {
        // In cooperative mode the waiting thread is the one that pumps the
        // loop; in threaded mode (or with no reactor) the resolution is
        // handed off by whichever thread settles, and waiting just blocks.
        let driver = self
            .reactor
            .clone()
            .filter(|reactor| !reactor.is_threaded());
        loop {
            {
                let mut state = self.shared.state.lock();
                match &*state {
                    State::Settled(_) => {
                        let State::Settled(result) = mem::replace(&mut *state, State::Consumed)
                        else {
                            unreachable!("matched Settled above");
                        };
                        return result;
                    }
                    State::Cancelled | State::Consumed => return Err(Error::already_consumed()),
                    State::Pending { .. } => {
                        if driver.is_none() {
                            self.shared.settled.wait_for(&mut state, HANDOFF_POLL);
                            continue;
                        }
                    }
                }
            }
            if let Some(reactor) = &driver {
                if !reactor.pump_one() {
                    reactor.park();
                }
            }
        }
    }

    /// Cancels the promise: pending work's eventual result is discarded,
    /// and any later consuming operation fails with the "already consumed"
    /// condition. Never blocks.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        match &*state {
            State::Consumed => {}
            _ => {
                *state = State::Cancelled;
                self.shared.settled.notify_all();
            }
        }
    }
}

impl Promise<()> {
    /// Attaches a continuation taking no arguments — the side-effect-only
    /// form used with void resolutions such as timers.
    pub fn then_void<U, F>(self, op: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce() -> Result<U> + Send + 'static,
    {
        self.then(move |()| op())
    }
}

/// A promise carrying no value; continuations take no arguments.
pub type VoidPromise = Promise<()>;

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.shared.state.lock().name())
            .finish()
    }
}

impl<T: Send + 'static> Fulfiller<T> {
    /// Fulfills the promise with a value.
    pub fn fulfill(self, value: T) {
        self.shared.settle(Ok(value));
    }

    /// Rejects the promise with an error.
    pub fn reject(self, error: Error) {
        self.shared.settle(Err(error));
    }

    /// Delivers a ready result, fulfilling or rejecting accordingly.
    pub fn resolve(self, result: Result<T>) {
        self.shared.settle(result);
    }
}

impl<T> fmt::Debug for Fulfiller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fulfiller")
            .field("state", &self.shared.state.lock().name())
            .finish()
    }
}

struct JoinState<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    fulfiller: Option<Fulfiller<Vec<T>>>,
}

/// Waits for every promise in the list, resolving to their values in input
/// order. The first rejection rejects the join; remaining branches still
/// settle on their own but their results are discarded.
#[must_use]
pub fn join<T: Send + 'static>(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
    let reactor = promises.iter().find_map(|p| p.reactor.clone());
    let (mut joined, fulfiller) = pair::<Vec<T>>();
    joined.reactor = reactor;

    let count = promises.len();
    if count == 0 {
        fulfiller.fulfill(Vec::new());
        return joined;
    }

    let state = Arc::new(Mutex::new(JoinState {
        slots: (0..count).map(|_| None).collect(),
        remaining: count,
        fulfiller: Some(fulfiller),
    }));

    for (index, promise) in promises.into_iter().enumerate() {
        let state = state.clone();
        promise.on_settle(move |result| {
            let mut guard = state.lock();
            match result {
                Ok(value) => {
                    guard.slots[index] = Some(value);
                    guard.remaining -= 1;
                    if guard.remaining == 0 {
                        if let Some(fulfiller) = guard.fulfiller.take() {
                            let values: Vec<T> = guard.slots.drain(..).flatten().collect();
                            drop(guard);
                            fulfiller.fulfill(values);
                        }
                    }
                }
                Err(e) => {
                    if let Some(fulfiller) = guard.fulfiller.take() {
                        drop(guard);
                        fulfiller.reject(e);
                    }
                }
            }
        });
    }

    joined
}
