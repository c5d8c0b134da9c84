//! Server-side call execution.
//!
//! A [`Server`] implements an interface's methods. Each invocation runs as
//! one reactor turn: absent declared parameters are filled with typed
//! defaults (capability parameters become branded null capabilities), the
//! method body runs under the server lock, and the outcome is routed per
//! [`MethodResult`] — immediate, deferred behind a void promise, or
//! forwarded as a tail call that hands the *original* call's result slot
//! to an inner call. Forwarding keeps per-hop state flat: a chain of
//! forwarding servers holds one pending result slot, not one per hop.

use crate::client::{dispatch_call, Client};
use crate::error::{Error, ErrorKind, Result};
use crate::pipeline::CallSlot;
use crate::promise::VoidPromise;
use crate::reactor::ReactorHandle;
use crate::request::Request;
use crate::response::Response;
use crate::schema::{FieldDescriptor, Interface, MethodDescriptor};
use crate::value::{SetFlavor, Value, ValueType};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A dispatch target implementing an interface's methods.
///
/// `dispatch_call` receives the method name, the (default-filled)
/// parameters, and a [`CallContext`] for setting named results or issuing
/// a tail call. Returning `Err` rejects the caller's promise with that
/// error.
pub trait Server: Send {
    /// Executes one method call.
    fn dispatch_call(
        &mut self,
        method: &str,
        params: &Params,
        context: &CallContext,
    ) -> Result<MethodResult>;
}

/// How a method body concluded.
#[derive(Debug)]
pub enum MethodResult {
    /// Results (if any) were set through the context; respond now.
    Done,
    /// Respond now with these values, bound to the declared result fields
    /// in order. Returning more values than declared fields is an error.
    Values(Vec<Value>),
    /// The method is still running; respond when this promise fulfills.
    /// Results set through the context up to that point are kept.
    Async(VoidPromise),
    /// Forward the call: the inner call's response becomes this call's
    /// response, with no intermediate bookkeeping on this hop.
    TailCall(Request),
}

/// Read-only view of one call's parameters, with every declared field
/// present (absent arguments carry their typed default).
#[derive(Debug)]
pub struct Params {
    fields: BTreeMap<String, Value>,
}

impl Params {
    /// Returns a parameter by name.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.fields.get(name).ok_or_else(|| Error::unknown_field(name))
    }

    /// Returns an integer parameter.
    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.get(name)?
            .as_int()
            .ok_or_else(|| wrong_type(name, ValueType::Int))
    }

    /// Returns a boolean parameter.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| wrong_type(name, ValueType::Bool))
    }

    /// Returns a text parameter.
    pub fn get_text(&self, name: &str) -> Result<&str> {
        self.get(name)?
            .as_text()
            .ok_or_else(|| wrong_type(name, ValueType::Text))
    }

    /// Returns a capability parameter as a callable client.
    pub fn get_capability(&self, name: &str) -> Result<Client> {
        self.get(name)?
            .as_capability()
            .cloned()
            .ok_or_else(|| wrong_type(name, ValueType::Capability))
    }
}

fn wrong_type(name: &str, want: ValueType) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("Parameter `{name}` is not of type `{want}`."))
}

struct ContextInner {
    method: Arc<MethodDescriptor>,
    results: Mutex<BTreeMap<String, Value>>,
    reactor: ReactorHandle,
}

/// Per-call handle a method body uses to set results or forward the call.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<ContextInner>,
}

impl CallContext {
    fn new(method: Arc<MethodDescriptor>, reactor: ReactorHandle) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                method,
                results: Mutex::new(BTreeMap::new()),
                reactor,
            }),
        }
    }

    /// Sets a named result field, validated against its declaration.
    pub fn set_result(&self, field: &str, value: Value) -> Result<()> {
        let declared = self.inner.method.result_named(field).ok_or_else(|| {
            Error::unknown_field(field).with_message(format!(
                "Unknown field `{field}` for method `{}`.",
                self.inner.method.name
            ))
        })?;
        value.check_against(field, declared.ty, SetFlavor::Field)?;
        self.inner.results.lock().insert(field.to_string(), value);
        Ok(())
    }

    /// Converts a built request into the forwarding outcome, so a method
    /// body can end with `return context.tail_call(request);`.
    pub fn tail_call(&self, request: Request) -> Result<MethodResult> {
        Ok(MethodResult::TailCall(request))
    }

    /// The reactor this call runs on, for timers or further calls made
    /// from inside the method body.
    #[must_use]
    pub fn reactor(&self) -> &ReactorHandle {
        &self.inner.reactor
    }

    /// Binds positional return values to the declared result fields.
    fn adopt_values(&self, values: Vec<Value>) -> Result<()> {
        let declared = &self.inner.method.results;
        if values.len() > declared.len() {
            return Err(Error::too_many_results(
                &self.inner.method.name,
                declared.len(),
                values.len(),
            ));
        }
        for (field, value) in declared.iter().zip(values) {
            value.check_against(&field.name, field.ty, SetFlavor::Field)?;
            self.inner
                .results
                .lock()
                .insert(field.name.clone(), value);
        }
        Ok(())
    }

    /// Finalizes the response: unset declared result fields get their
    /// typed defaults.
    fn into_response(&self) -> Response {
        let mut fields = self.inner.results.lock().clone();
        for field in &self.inner.method.results {
            if !fields.contains_key(&field.name) {
                fields.insert(field.name.clone(), default_value(field, &self.inner.reactor));
            }
        }
        Response::new(fields)
    }
}

impl core::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallContext")
            .field("method", &self.inner.method.name)
            .finish_non_exhaustive()
    }
}

/// Typed default for an absent parameter or unset result field.
fn default_value(field: &FieldDescriptor, reactor: &ReactorHandle) -> Value {
    match field.ty {
        ValueType::Void | ValueType::AnyPointer => Value::Void,
        ValueType::Bool => Value::Bool(false),
        ValueType::Int => Value::Int(0),
        ValueType::Text => Value::Text(String::new()),
        ValueType::Data => Value::Data(Vec::new()),
        ValueType::List => Value::List(Vec::new()),
        ValueType::Struct => Value::Struct(BTreeMap::new()),
        ValueType::Capability => {
            let interface = field.interface.clone().unwrap_or_else(Interface::null);
            Value::Capability(Client::null(reactor, interface))
        }
    }
}

/// Runs one call against a local server. Invoked as a reactor turn.
pub(crate) fn execute_call(
    server: &Arc<Mutex<Box<dyn Server>>>,
    method: &Arc<MethodDescriptor>,
    mut args: BTreeMap<String, Value>,
    slot: CallSlot,
    reactor: &ReactorHandle,
) {
    for field in &method.params {
        if !args.contains_key(&field.name) {
            args.insert(field.name.clone(), default_value(field, reactor));
        }
    }
    let params = Params { fields: args };
    let context = CallContext::new(method.clone(), reactor.clone());

    tracing::trace!(method = %method.name, "dispatching call");
    let outcome = {
        let mut guard = server.lock();
        guard.dispatch_call(&method.name, &params, &context)
    };
    match outcome {
        Err(err) => slot.settle(Err(err)),
        Ok(MethodResult::Done) => slot.settle(Ok(context.into_response())),
        Ok(MethodResult::Values(values)) => match context.adopt_values(values) {
            Ok(()) => slot.settle(Ok(context.into_response())),
            Err(err) => slot.settle(Err(err)),
        },
        Ok(MethodResult::Async(promise)) => {
            promise.on_settle(move |settled| match settled {
                Ok(()) => slot.settle(Ok(context.into_response())),
                Err(err) => slot.settle(Err(err)),
            });
        }
        Ok(MethodResult::TailCall(request)) => match request.into_sent_parts() {
            Ok((target, inner_method, inner_args)) => {
                dispatch_call(&target, inner_method, inner_args, slot);
            }
            Err(err) => slot.settle(Err(err)),
        },
    }
}
