//! Single-use call builders.
//!
//! A [`Request`] binds a target client and method, accumulates named
//! arguments with declared-type validation, and transitions Building →
//! Sent exactly once. Mutation or a second send after that fails with the
//! "already sent" condition — construction errors surface here,
//! synchronously, never deferred into the returned promise.

use crate::client::{dispatch_call, Client, RemotePromise};
use crate::error::{Error, Result};
use crate::pipeline::{CallSlot, Pipeline, PipelineNode};
use crate::promise::pair_on;
use crate::schema::MethodDescriptor;
use crate::value::{SetFlavor, Value};
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

/// A mutable, single-use builder for one call's arguments.
#[derive(Debug)]
pub struct Request {
    target: Client,
    method: Arc<MethodDescriptor>,
    args: BTreeMap<String, Value>,
    sent: bool,
}

impl Request {
    pub(crate) fn new(target: Client, method: Arc<MethodDescriptor>) -> Self {
        Self {
            target,
            method,
            args: BTreeMap::new(),
            sent: false,
        }
    }

    /// Returns the bound method's name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    pub(crate) fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// Sets a named argument field, validating it against the method's
    /// declared parameter list.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if self.sent {
            return Err(Error::already_sent());
        }
        let declared = self.method.param_named(field).ok_or_else(|| {
            Error::unknown_field(field).with_message(format!(
                "Unknown field `{field}` for method `{}`.",
                self.method.name
            ))
        })?;
        value.check_against(field, declared.ty, SetFlavor::Field)?;
        self.args.insert(field.to_string(), value);
        Ok(())
    }

    pub(crate) fn set_argument(&mut self, field: &str, value: Value) -> Result<()> {
        if self.sent {
            return Err(Error::already_sent());
        }
        let declared = self.method.param_named(field).ok_or_else(|| {
            Error::unknown_field(field).with_message(format!(
                "Can't set argument `{field}` to `{value}` (argument does not exist)"
            ))
        })?;
        value.check_against(field, declared.ty, SetFlavor::Argument)?;
        self.args.insert(field.to_string(), value);
        Ok(())
    }

    /// Sends the request. The first send transitions the request to its
    /// terminal Sent state; any further send fails with the "already
    /// sent" condition.
    pub fn send(&mut self) -> Result<RemotePromise> {
        if self.sent {
            return Err(Error::already_sent());
        }
        self.sent = true;
        let reactor = self.target.reactor().clone();
        let (promise, fulfiller) = pair_on(reactor.clone());
        let node = PipelineNode::new();
        dispatch_call(
            &self.target,
            self.method.clone(),
            mem::take(&mut self.args),
            CallSlot::new(fulfiller, node.clone()),
        );
        Ok(RemotePromise::new(promise, Pipeline::new(node, reactor)))
    }

    /// Splits a not-yet-sent request into its dispatch parts, marking it
    /// sent. Used by tail-call forwarding, where the original call's
    /// result slot is attached instead of a fresh one.
    pub(crate) fn into_sent_parts(
        mut self,
    ) -> Result<(Client, Arc<MethodDescriptor>, BTreeMap<String, Value>)> {
        if self.sent {
            return Err(Error::already_sent());
        }
        self.sent = true;
        Ok((
            self.target.clone(),
            self.method.clone(),
            mem::take(&mut self.args),
        ))
    }
}
