//! Error types and error handling strategy for Capwire.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Construction errors (bad arguments, unknown names) surface
//!   synchronously at call-building time, never deferred into a promise
//! - Protocol errors (null capability, too many results, consuming a
//!   spent promise) surface as rejected promises when discovered during a
//!   call, or synchronously on local API misuse
//! - User method errors reject the call's promise; a rejection handler
//!   that itself fails rejects the next link in the chain
//! - No category is retried automatically; retry policy is a caller
//!   concern
//!
//! # Error Categories
//!
//! - **Construction**: argument arity/type mismatch, unknown field or
//!   method, disallowed positional call
//! - **Protocol**: null capability called, too many result values, upcast
//!   to a non-ancestor, consuming a spent promise, re-sending a request
//! - **Lifecycle**: released clients, reactor ownership
//! - **User**: failures raised inside server methods
//! - **Internal**: engine bugs and invalid states

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Construction ===
    /// Method name not present in the target interface's method table.
    UnknownMethod,
    /// Field name not declared by the method's parameter or result list.
    UnknownField,
    /// Value does not match the field's declared type.
    TypeMismatch,
    /// More positional arguments than declared parameters.
    TooManyArguments,
    /// Positional arguments against a parameter list with no implicit
    /// ordering.
    PositionalNotAllowed,

    // === Protocol ===
    /// The request was already sent.
    AlreadySent,
    /// The promise was already consumed (waited, chained, or cancelled).
    AlreadyConsumed,
    /// A method returned more positional values than declared result
    /// fields.
    TooManyResults,
    /// A call was made on a null capability.
    NullCapability,
    /// Upcast target is not a declared ancestor interface.
    NotSuperclass,
    /// A pipelined field resolved to a non-capability value but was called
    /// as a capability.
    NotACapability,

    // === Lifecycle ===
    /// The client handle was released.
    Released,
    /// A reactor is already active in this process.
    ReactorActive,
    /// The operation was cancelled.
    Cancelled,

    // === User ===
    /// A failure raised inside a server method.
    Failed,

    // === Internal ===
    /// Internal engine error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownMethod
            | Self::UnknownField
            | Self::TypeMismatch
            | Self::TooManyArguments
            | Self::PositionalNotAllowed => ErrorCategory::Construction,
            Self::AlreadySent
            | Self::AlreadyConsumed
            | Self::TooManyResults
            | Self::NullCapability
            | Self::NotSuperclass
            | Self::NotACapability => ErrorCategory::Protocol,
            Self::Released | Self::ReactorActive | Self::Cancelled => ErrorCategory::Lifecycle,
            Self::Failed => ErrorCategory::User,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Local API misuse discovered while building a call.
    Construction,
    /// Violations of the call/promise protocol.
    Protocol,
    /// Handle and reactor lifecycle failures.
    Lifecycle,
    /// User-originated errors from server methods.
    User,
    /// Internal engine errors.
    Internal,
}

/// The main error type for Capwire operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates a user failure error, as raised inside a server method.
    #[must_use]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed).with_message(msg)
    }

    /// Creates an unknown-method lookup error.
    #[must_use]
    pub fn unknown_method(interface: &str, method: &str) -> Self {
        Self::new(ErrorKind::UnknownMethod)
            .with_message(format!("Unknown method `{method}` on interface `{interface}`."))
    }

    /// Creates an error for a response/results field that does not exist.
    #[must_use]
    pub fn unknown_field(name: &str) -> Self {
        Self::new(ErrorKind::UnknownField).with_message(format!("Unknown field `{name}`."))
    }

    /// Creates the error for sending a request twice.
    #[must_use]
    pub fn already_sent() -> Self {
        Self::new(ErrorKind::AlreadySent).with_message("Request has already been sent.")
    }

    /// Creates the error for consuming a spent or cancelled promise.
    #[must_use]
    pub fn already_consumed() -> Self {
        Self::new(ErrorKind::AlreadyConsumed).with_message(
            "Promise was already used in a consuming operation. \
             You can no longer use this Promise object",
        )
    }

    /// Creates the error for a method returning more values than its
    /// declared result fields.
    #[must_use]
    pub fn too_many_results(method: &str, expected: usize, got: usize) -> Self {
        Self::new(ErrorKind::TooManyResults).with_message(format!(
            "Too many values returned from `{method}`. Expected `{expected}` got `{got}`"
        ))
    }

    /// Creates the error for calling a null capability.
    #[must_use]
    pub fn null_capability() -> Self {
        Self::new(ErrorKind::NullCapability).with_message("Called null capability.")
    }

    /// Creates the error for upcasting to a non-ancestor interface.
    #[must_use]
    pub fn not_superclass() -> Self {
        Self::new(ErrorKind::NotSuperclass).with_message("Can't upcast to non-superclass.")
    }

    /// Creates the error for calling through a pipelined field that
    /// resolved to a plain value.
    #[must_use]
    pub fn not_a_capability(path: &str) -> Self {
        Self::new(ErrorKind::NotACapability)
            .with_message(format!("Pipelined field `{path}` is not a capability."))
    }

    /// Creates the error for using a released client handle.
    #[must_use]
    pub fn released() -> Self {
        Self::new(ErrorKind::Released)
            .with_message("Client has been released and can no longer be used.")
    }

    /// Creates the error for entering a second reactor.
    #[must_use]
    pub fn reactor_active() -> Self {
        Self::new(ErrorKind::ReactorActive).with_message(
            "An event loop is already active in this process. \
             Tear it down before creating another.",
        )
    }

    /// Creates an internal error (engine bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for Capwire operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_message() {
        let err = Error::new(ErrorKind::UnknownMethod).with_message("no such method");
        assert_eq!(err.to_string(), "UnknownMethod: no such method");
    }

    #[test]
    fn categories_match_kind() {
        assert_eq!(
            ErrorKind::TypeMismatch.category(),
            ErrorCategory::Construction
        );
        assert_eq!(ErrorKind::NullCapability.category(), ErrorCategory::Protocol);
        assert_eq!(ErrorKind::Failed.category(), ErrorCategory::User);
    }

    #[test]
    fn canned_messages() {
        assert_eq!(
            Error::too_many_results("foo", 1, 2).message(),
            Some("Too many values returned from `foo`. Expected `1` got `2`")
        );
        assert_eq!(
            Error::null_capability().message(),
            Some("Called null capability.")
        );
        assert_eq!(
            Error::not_superclass().message(),
            Some("Can't upcast to non-superclass.")
        );
    }

    #[test]
    fn cancelled_predicate() {
        assert!(Error::new(ErrorKind::Cancelled).is_cancelled());
        assert!(!Error::failed("nope").is_cancelled());
    }
}
