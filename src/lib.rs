//! Capwire: the call-dispatch and promise-resolution engine of a
//! capability RPC system.
//!
//! # Overview
//!
//! Capwire implements the core of a capability-based RPC runtime: a caller
//! obtains a [`Client`] referring to a capability, issues a [`Request`]
//! against one of its methods, and receives a promise for the eventual
//! [`Response`]. The engine's job is purely coordination:
//!
//! - **Promise core**: single-resolution promises with chained
//!   continuations, cancellation, and cross-thread delivery.
//! - **Server dispatch**: routing an incoming call to a user-supplied
//!   [`Server`] method and converting its outcome into a promise result.
//! - **Promise pipelining**: referencing a capability embedded in a
//!   not-yet-completed response, with queued calls replayed in order once
//!   the parent call resolves.
//! - **Tail-call forwarding**: redirecting a call's result to be identical
//!   to a second call's result without holding the first call's resources
//!   open.
//! - **Capability casting**: checked upcasts along declared interface
//!   ancestry, and unchecked reinterpretation.
//!
//! Schema compilation, binary wire layout, and socket transport are
//! external collaborators. The [`value`] module models the codec boundary
//! as a dynamic value with declared types; the [`schema`] module models
//! interfaces as explicit method tables built at definition time.
//!
//! # Core Guarantees
//!
//! - **Single resolution**: exactly one terminal state reaches a promise's
//!   creator unless it is explicitly cancelled.
//! - **Send-once requests**: a request transitions Building → Sent exactly
//!   once; mutation or re-send after that fails.
//! - **No lost pipelined calls**: calls issued through an unresolved
//!   pipeline are replayed FIFO per field path once the parent resolves,
//!   or rejected with the parent's error.
//! - **Flat tail calls**: forwarding releases the original call context at
//!   forward time, so resource usage does not grow with forwarding depth.
//!
//! # Module Structure
//!
//! - [`error`]: Error types and taxonomy
//! - [`value`]: Dynamic values with declared types (codec stand-in)
//! - [`schema`]: Interface method tables and ancestry (cast registry)
//! - [`promise`]: Promise state machine, chaining, `join`
//! - [`reactor`]: Cooperative/threaded event loop and timers
//! - [`client`]: Capability client handles and casting
//! - [`request`]: Single-use call builders
//! - [`response`]: Immutable call results
//! - [`server`]: Server trait, call context, dispatch
//! - [`pipeline`]: Pipelining broker
//! - [`restore`]: Legacy restorer bootstrap (deprecated)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod client;
pub mod error;
pub mod pipeline;
pub mod promise;
pub mod reactor;
pub mod request;
pub mod response;
pub mod restore;
pub mod schema;
pub mod server;
pub mod value;

pub use client::{CallBuilder, Client, RemotePromise};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::Pipeline;
pub use promise::{join, pair, Fulfiller, Promise, VoidPromise};
pub use reactor::{Reactor, ReactorHandle, Timer};
pub use request::Request;
pub use response::Response;
pub use restore::{restore_client, Restorer};
pub use schema::{FieldDescriptor, Interface, InterfaceBuilder, MethodDescriptor};
pub use server::{CallContext, MethodResult, Params, Server};
pub use value::{Value, ValueType};

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared helpers for unit tests that need exclusive reactor access.
    //!
    //! Only one reactor may be active per process, so tests that enter one
    //! serialize on this lock.

    use parking_lot::{Mutex, MutexGuard};

    static REACTOR_TEST_LOCK: Mutex<()> = Mutex::new(());

    pub fn exclusive_reactor_access() -> MutexGuard<'static, ()> {
        REACTOR_TEST_LOCK.lock()
    }
}
