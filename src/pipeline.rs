//! The pipelining broker: capability references into unresolved results.
//!
//! Every sent call carries a [`PipelineNode`] alongside its promise. The
//! node settles with the call's outcome, and any number of pipelined
//! handles may be derived from it before that happens. A pipelined
//! capability queues calls while the parent is unresolved and replays them
//! FIFO, per field path, against the real client once the parent resolves;
//! if the parent rejects, every queued call rejects with the same error
//! rather than being silently dropped. Once resolved, later calls on the
//! handle forward directly — no round trip through the queue.

use crate::client::{dispatch_call, Client};
use crate::error::{Error, Result};
use crate::promise::{pair_on, Fulfiller, Promise};
use crate::reactor::ReactorHandle;
use crate::response::Response;
use crate::schema::{Interface, MethodDescriptor};
use crate::value::Value;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// A field path into an eventual response.
pub(crate) type FieldPath = SmallVec<[String; 4]>;

type Waiter = Box<dyn FnOnce(&Result<Response>) + Send>;

enum NodeState {
    Pending(Vec<Waiter>),
    Done(Result<Response>),
}

/// The per-call resolution point shared by a call's promise and every
/// pipelined handle derived from it.
pub(crate) struct PipelineNode {
    state: Mutex<NodeState>,
}

impl PipelineNode {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NodeState::Pending(Vec::new())),
        })
    }

    /// Runs `waiter` with the call outcome: immediately if already
    /// resolved, otherwise when resolution arrives.
    fn on_resolve(&self, waiter: Waiter) {
        let mut state = self.state.lock();
        match &mut *state {
            NodeState::Pending(waiters) => waiters.push(waiter),
            NodeState::Done(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                waiter(&outcome);
            }
        }
    }

    /// Delivers the call outcome to every registered waiter, in
    /// registration order. First resolution wins.
    pub(crate) fn resolve(&self, outcome: Result<Response>) {
        let waiters = {
            let mut state = self.state.lock();
            match &mut *state {
                NodeState::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = NodeState::Done(outcome.clone());
                    waiters
                }
                NodeState::Done(_) => return,
            }
        };
        for waiter in waiters {
            waiter(&outcome);
        }
    }
}

impl core::fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = match &*self.state.lock() {
            NodeState::Pending(waiters) => format!("Pending({} waiters)", waiters.len()),
            NodeState::Done(Ok(_)) => "Resolved".to_string(),
            NodeState::Done(Err(_)) => "Broken".to_string(),
        };
        f.debug_struct("PipelineNode").field("state", &state).finish()
    }
}

/// The settlement slot of one call: fulfills the caller's promise and
/// resolves the pipeline node with one delivery.
pub(crate) struct CallSlot {
    fulfiller: Fulfiller<Response>,
    node: Arc<PipelineNode>,
}

impl CallSlot {
    pub(crate) fn new(fulfiller: Fulfiller<Response>, node: Arc<PipelineNode>) -> Self {
        Self { fulfiller, node }
    }

    pub(crate) fn settle(self, outcome: Result<Response>) {
        // Pipelined children resolve before the caller's own continuation,
        // preserving FIFO replay ahead of calls issued after wait().
        self.node.resolve(outcome.clone());
        self.fulfiller.resolve(outcome);
    }
}

impl core::fmt::Debug for CallSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallSlot").finish_non_exhaustive()
    }
}

/// Pipelined access to a call's eventual response.
#[derive(Debug, Clone)]
pub struct Pipeline {
    node: Arc<PipelineNode>,
    reactor: ReactorHandle,
}

impl Pipeline {
    pub(crate) fn new(node: Arc<PipelineNode>, reactor: ReactorHandle) -> Self {
        Self { node, reactor }
    }

    /// Derives a client for a capability-valued field of the eventual
    /// response. Never blocks: calls made through the client before the
    /// parent resolves are queued and replayed in issue order.
    #[must_use]
    pub fn get_capability(&self, path: &[&str], interface: &Interface) -> Client {
        let cap = Arc::new(PipelinedCap {
            path: path.iter().map(|s| (*s).to_string()).collect(),
            state: Mutex::new(CapState::Pending(VecDeque::new())),
        });
        let registered = cap.clone();
        self.node.on_resolve(Box::new(move |outcome| {
            registered.parent_resolved(outcome);
        }));
        Client::pipelined(&self.reactor, interface.clone(), cap)
    }

    /// Derives a promise for any field of the eventual response, resolving
    /// to the field's value once the parent resolves. The non-capability
    /// counterpart of [`Self::get_capability`].
    #[must_use]
    pub fn get_field(&self, path: &[&str]) -> Promise<Value> {
        let (promise, fulfiller) = pair_on::<Value>(self.reactor.clone());
        let path: FieldPath = path.iter().map(|s| (*s).to_string()).collect();
        self.node.on_resolve(Box::new(move |outcome| {
            match outcome {
                Ok(response) => fulfiller.resolve(response.get_path(&path).cloned()),
                Err(e) => fulfiller.reject(e.clone()),
            }
        }));
        promise
    }
}

/// A queued call against a not-yet-resolved pipelined capability.
pub(crate) struct QueuedCall {
    method: Arc<MethodDescriptor>,
    args: BTreeMap<String, Value>,
    slot: CallSlot,
}

enum CapState {
    /// Parent unresolved; calls queue here in issue order.
    Pending(VecDeque<QueuedCall>),
    /// Parent resolved to a capability; calls forward directly.
    Ready(Client),
    /// Parent resolved, but the field is a plain value.
    Value(Value),
    /// Parent rejected (or the field path was invalid).
    Broken(Error),
}

/// The promise-backed capability behind a pipelined client.
pub(crate) struct PipelinedCap {
    path: FieldPath,
    state: Mutex<CapState>,
}

impl PipelinedCap {
    fn dotted_path(&self) -> String {
        self.path.join(".")
    }

    /// Reads the resolved field value, if the parent resolved to a
    /// non-capability value.
    pub(crate) fn resolved_value(&self) -> Option<Value> {
        match &*self.state.lock() {
            CapState::Value(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Queues a call if the parent is unresolved, otherwise forwards it.
    pub(crate) fn call(
        &self,
        method: Arc<MethodDescriptor>,
        args: BTreeMap<String, Value>,
        slot: CallSlot,
    ) {
        let forward = {
            let mut state = self.state.lock();
            match &mut *state {
                CapState::Pending(queue) => {
                    queue.push_back(QueuedCall { method, args, slot });
                    return;
                }
                CapState::Ready(client) => Ok(client.clone()),
                CapState::Value(_) => Err(Error::not_a_capability(&self.dotted_path())),
                CapState::Broken(e) => Err(e.clone()),
            }
        };
        match forward {
            Ok(client) => dispatch_call(&client, method, args, slot),
            Err(e) => slot.settle(Err(e)),
        }
    }

    /// Transitions out of Pending once the parent call settles, replaying
    /// queued calls FIFO (or rejecting them all with the parent's error).
    fn parent_resolved(&self, outcome: &Result<Response>) {
        // The parent resolving to a capability here means it lives on the
        // same party as the caller, so replayed calls forward directly.
        let replay_target = match outcome {
            Err(e) => Err(e.clone()),
            Ok(response) => match response.get_path(&self.path) {
                Ok(Value::Capability(client)) => Ok(client.clone()),
                Ok(_) => Err(Error::not_a_capability(&self.dotted_path())),
                Err(e) => Err(e),
            },
        };
        let queued = {
            let mut state = self.state.lock();
            let drained = match &mut *state {
                CapState::Pending(queue) => std::mem::take(queue),
                // Resolution is single-shot; a second delivery is a bug
                // upstream and ignored here.
                _ => return,
            };
            *state = match (&replay_target, outcome) {
                (Ok(client), _) => CapState::Ready(client.clone()),
                (Err(_), Ok(response)) => match response.get_path(&self.path) {
                    Ok(value) => CapState::Value(value.clone()),
                    Err(e) => CapState::Broken(e),
                },
                (Err(e), Err(_)) => CapState::Broken(e.clone()),
            };
            drained
        };
        if !queued.is_empty() {
            tracing::trace!(path = %self.dotted_path(), count = queued.len(),
                "replaying pipelined calls");
        }
        for call in queued {
            match &replay_target {
                Ok(client) => dispatch_call(client, call.method, call.args, call.slot),
                Err(e) => call.slot.settle(Err(e.clone())),
            }
        }
    }
}

impl core::fmt::Debug for PipelinedCap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = match &*self.state.lock() {
            CapState::Pending(queue) => format!("Pending({} queued)", queue.len()),
            CapState::Ready(_) => "Ready".to_string(),
            CapState::Value(_) => "Value".to_string(),
            CapState::Broken(_) => "Broken".to_string(),
        };
        f.debug_struct("PipelinedCap")
            .field("path", &self.dotted_path())
            .field("state", &state)
            .finish()
    }
}
