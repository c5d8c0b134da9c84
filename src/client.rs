//! Capability client handles.
//!
//! A [`Client`] is a cheap-to-clone handle referring to exactly one
//! capability: local (backed by a [`crate::Server`]), null (every call
//! fails deterministically), or promise-backed (a pipelined capability
//! whose real target is not yet known). A client is safely shared by
//! multiple callers for issuing concurrent calls, but must not be
//! released while a call against it is outstanding; once released it
//! participates in no further calls.
//!
//! Casting: [`Client::upcast`] is checked against declared interface
//! ancestry; [`Client::cast_as`] is the capability-table equivalent of a
//! checked pointer reinterpretation — it trusts the caller, and a mismatch
//! surfaces only when a subsequently attempted method is absent on the
//! runtime target.

use crate::error::{Error, Result};
use crate::pipeline::{CallSlot, Pipeline, PipelinedCap};
use crate::promise::Promise;
use crate::reactor::ReactorHandle;
use crate::request::Request;
use crate::response::Response;
use crate::schema::{Interface, MethodDescriptor};
use crate::server::{execute_call, Server};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) enum ClientKind {
    /// Backed by a server instance on this party.
    Local(Arc<Mutex<Box<dyn Server>>>),
    /// A capability with no implementation; all calls fail.
    Null,
    /// Backed by an unresolved pipelined field.
    Pipelined(Arc<PipelinedCap>),
}

struct ClientInner {
    interface: Interface,
    kind: ClientKind,
    reactor: ReactorHandle,
    released: AtomicBool,
}

/// A disposable handle referring to one capability.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client backed by a local server instance implementing
    /// `interface`.
    #[must_use]
    pub fn local(
        reactor: &ReactorHandle,
        interface: Interface,
        server: impl Server + 'static,
    ) -> Self {
        Self::with_kind(
            reactor,
            interface,
            ClientKind::Local(Arc::new(Mutex::new(Box::new(server)))),
        )
    }

    /// Creates a null capability branded with the given interface. Every
    /// call on it fails with the "called null capability" condition,
    /// without invoking any server code.
    #[must_use]
    pub fn null(reactor: &ReactorHandle, interface: Interface) -> Self {
        Self::with_kind(reactor, interface, ClientKind::Null)
    }

    pub(crate) fn pipelined(
        reactor: &ReactorHandle,
        interface: Interface,
        cap: Arc<PipelinedCap>,
    ) -> Self {
        Self::with_kind(reactor, interface, ClientKind::Pipelined(cap))
    }

    fn with_kind(reactor: &ReactorHandle, interface: Interface, kind: ClientKind) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                interface,
                kind,
                reactor: reactor.clone(),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the client's static interface.
    #[must_use]
    pub fn interface(&self) -> &Interface {
        &self.inner.interface
    }

    /// Returns true if this handle refers to the null capability.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.inner.kind, ClientKind::Null)
    }

    pub(crate) fn reactor(&self) -> &ReactorHandle {
        &self.inner.reactor
    }

    /// If this client is a pipelined handle whose parent resolved to a
    /// plain (non-capability) value, returns that value.
    #[must_use]
    pub fn resolved_value(&self) -> Option<Value> {
        match &self.inner.kind {
            ClientKind::Pipelined(cap) => cap.resolved_value(),
            _ => None,
        }
    }

    /// Starts a bare request for the named method. Unknown method names
    /// fail here, synchronously.
    pub fn request(&self, method: &str) -> Result<Request> {
        self.check_usable()?;
        let descriptor = self.resolve_method(method)?;
        Ok(Request::new(self.clone(), descriptor))
    }

    /// Starts a fluent call builder for the named method — the
    /// build-and-send convenience over [`Self::request`].
    pub fn call(&self, method: &str) -> Result<CallBuilder> {
        Ok(CallBuilder {
            request: self.request(method)?,
            positional: 0,
        })
    }

    /// Reinterprets this client as an ancestor interface. Fails unless
    /// `target` is the client's own interface or a declared (transitive)
    /// superclass.
    pub fn upcast(&self, target: &Interface) -> Result<Self> {
        if !self.inner.interface.descends_from(target) {
            return Err(Error::not_superclass());
        }
        Ok(self.rebrand(target))
    }

    /// Reinterprets this client as an arbitrary interface, with no
    /// ancestry check. A mismatch surfaces when a later method lookup
    /// misses on the runtime target.
    #[must_use]
    pub fn cast_as(&self, target: &Interface) -> Self {
        self.rebrand(target)
    }

    fn rebrand(&self, target: &Interface) -> Self {
        let kind = match &self.inner.kind {
            ClientKind::Local(server) => ClientKind::Local(server.clone()),
            ClientKind::Null => ClientKind::Null,
            ClientKind::Pipelined(cap) => ClientKind::Pipelined(cap.clone()),
        };
        Self::with_kind(&self.inner.reactor, target.clone(), kind)
    }

    /// Releases this handle. Exactly once: a second release, or any call
    /// through a released handle, fails.
    pub fn release(&self) -> Result<()> {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return Err(Error::released());
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(Error::released());
        }
        Ok(())
    }

    fn resolve_method(&self, method: &str) -> Result<Arc<MethodDescriptor>> {
        // A null capability accepts any method shape; the call itself
        // rejects at dispatch before lookup could matter.
        if self.is_null() {
            return self
                .inner
                .interface
                .resolve_method(method)
                .or_else(|_| Ok(Arc::new(MethodDescriptor::new(method))));
        }
        self.inner.interface.resolve_method(method)
    }
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match &self.inner.kind {
            ClientKind::Local(_) => "local",
            ClientKind::Null => "null",
            ClientKind::Pipelined(_) => "pipelined",
        };
        f.debug_struct("Client")
            .field("interface", &self.inner.interface.name())
            .field("kind", &kind)
            .field("released", &self.inner.released.load(Ordering::Acquire))
            .finish()
    }
}

/// Routes one call to its target: local dispatch turns are enqueued on the
/// reactor, null capabilities reject immediately, and pipelined targets
/// queue or forward.
pub(crate) fn dispatch_call(
    client: &Client,
    method: Arc<MethodDescriptor>,
    args: BTreeMap<String, Value>,
    slot: CallSlot,
) {
    if client.inner.released.load(Ordering::Acquire) {
        slot.settle(Err(Error::released()));
        return;
    }
    match &client.inner.kind {
        ClientKind::Null => {
            tracing::debug!(method = %method.name, "call on null capability");
            slot.settle(Err(Error::null_capability()));
        }
        ClientKind::Local(server) => {
            let server = server.clone();
            let reactor = client.inner.reactor.clone();
            let turn_reactor = reactor.clone();
            reactor.enqueue(move || {
                execute_call(&server, &method, args, slot, &turn_reactor);
            });
        }
        ClientKind::Pipelined(cap) => cap.call(method, args, slot),
    }
}

/// Fluent builder for one call: named and (where declared) positional
/// arguments, validated as they are bound.
#[derive(Debug)]
pub struct CallBuilder {
    request: Request,
    positional: usize,
}

impl CallBuilder {
    /// Binds the next positional argument. Permitted only when the
    /// method's parameter list has an implicit ordinal ordering.
    pub fn positional(mut self, value: Value) -> Result<Self> {
        let method = self.request.method().clone();
        if !method.implicit_param_order {
            return Err(Error::new(crate::error::ErrorKind::PositionalNotAllowed)
                .with_message(format!(
                    "Cannot call method `{}` with positional args, since its param \
                     struct is not implicitly defined and thus does not have a set \
                     order of arguments",
                    method.name
                )));
        }
        if self.positional >= method.params.len() {
            return Err(Error::new(crate::error::ErrorKind::TooManyArguments)
                .with_message(format!(
                    "Too many arguments to `{}`. Expected {} and got {}",
                    method.name,
                    method.params.len(),
                    self.positional + 1
                )));
        }
        let field = method.params[self.positional].name.clone();
        self.positional += 1;
        self.request.set_argument(&field, value)?;
        Ok(self)
    }

    /// Binds a named argument.
    pub fn arg(mut self, name: &str, value: Value) -> Result<Self> {
        self.request.set_argument(name, value)?;
        Ok(self)
    }

    /// Sends the call.
    pub fn send(mut self) -> Result<RemotePromise> {
        self.request.send()
    }

    /// Finishes building without sending, yielding the request — used to
    /// hand a built call to tail-call forwarding.
    #[must_use]
    pub fn into_request(self) -> Request {
        self.request
    }
}

/// The caller-side result of a sent call: a promise for the response plus
/// pipelined access to its fields before resolution.
#[derive(Debug)]
pub struct RemotePromise {
    promise: Promise<Response>,
    pipeline: Pipeline,
}

impl RemotePromise {
    pub(crate) fn new(promise: Promise<Response>, pipeline: Pipeline) -> Self {
        Self { promise, pipeline }
    }

    /// Blocks until the call settles, driving the cooperative reactor.
    pub fn wait(self) -> Result<Response> {
        self.promise.wait()
    }

    /// Attaches a fulfillment continuation to the call's promise.
    pub fn then<U, F>(self, op: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(Response) -> Result<U> + Send + 'static,
    {
        self.promise.then(op)
    }

    /// Attaches fulfillment and rejection continuations.
    pub fn then_catch<U, F, G>(self, op: F, on_err: G) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(Response) -> Result<U> + Send + 'static,
        G: FnOnce(Error) -> Result<U> + Send + 'static,
    {
        self.promise.then_catch(op, on_err)
    }

    /// Cancels the call: local observers see the promise as consumed, and
    /// the eventual result is discarded. Never blocks.
    pub fn cancel(&self) {
        self.promise.cancel();
    }

    /// Pipelined access to the eventual response's fields.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Derives a client for a capability-valued field of the eventual
    /// response without waiting. See [`Pipeline::get_capability`].
    #[must_use]
    pub fn pipelined_capability(&self, path: &[&str], interface: &Interface) -> Client {
        self.pipeline.get_capability(path, interface)
    }

    /// Consumes the call into its promise half, dropping pipelined access.
    #[must_use]
    pub fn into_promise(self) -> Promise<Response> {
        self.promise
    }
}
