//! Dynamic values with declared types.
//!
//! This module is the engine's view of the struct/list codec collaborator:
//! call arguments and results travel as [`Value`]s, and request building
//! and result writing validate them against declared [`ValueType`]s. The
//! binary layout of these values on the wire is out of scope; what matters
//! here is named-field get/set with type checking, and the fact that a
//! value may embed a live capability.

use crate::client::Client;
use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use std::collections::BTreeMap;

/// The declared type of a field.
///
/// Displayed in error messages using the codec's type names (`BOOL`,
/// `INT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value.
    Void,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Data,
    /// Homogeneous-ish list of values.
    List,
    /// Nested group of named fields.
    Struct,
    /// A capability reference.
    Capability,
    /// Any pointer-typed value; admits everything.
    AnyPointer,
}

impl ValueType {
    /// Returns true if a value of this declared type may hold `value`.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        *self == Self::AnyPointer || *self == value.type_of()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "VOID",
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Text => "TEXT",
            Self::Data => "DATA",
            Self::List => "LIST",
            Self::Struct => "STRUCT",
            Self::Capability => "CAPABILITY",
            Self::AnyPointer => "ANY_POINTER",
        };
        f.write_str(name)
    }
}

/// A dynamic value: one argument or result field of a call.
#[derive(Debug, Clone)]
pub enum Value {
    /// No value.
    Void,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Data(Vec<u8>),
    /// List of values.
    List(Vec<Value>),
    /// Nested group of named fields.
    Struct(BTreeMap<String, Value>),
    /// A capability reference.
    Capability(Client),
}

impl Value {
    /// Returns the runtime type of this value.
    #[must_use]
    pub fn type_of(&self) -> ValueType {
        match self {
            Self::Void => ValueType::Void,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Text(_) => ValueType::Text,
            Self::Data(_) => ValueType::Data,
            Self::List(_) => ValueType::List,
            Self::Struct(_) => ValueType::Struct,
            Self::Capability(_) => ValueType::Capability,
        }
    }

    /// Creates a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Creates a capability value.
    #[must_use]
    pub fn capability(client: Client) -> Self {
        Self::Capability(client)
    }

    /// Creates a struct value from named entries.
    #[must_use]
    pub fn struct_of<S, I>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Value)>,
    {
        Self::Struct(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Returns the integer value, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the text value, if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the capability, if this is a `Capability`.
    #[must_use]
    pub fn as_capability(&self) -> Option<&Client> {
        match self {
            Self::Capability(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the named fields, if this is a `Struct`.
    #[must_use]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Checks this value against a declared type, producing a typed
    /// mismatch error naming the value and the expected type.
    pub(crate) fn check_against(&self, field: &str, declared: ValueType, flavor: SetFlavor) -> Result<()> {
        if declared.admits(self) {
            return Ok(());
        }
        let msg = match flavor {
            SetFlavor::Argument => format!(
                "Can't set argument `{field}` to `{self}` (expected type `{declared}`)"
            ),
            SetFlavor::Field => {
                format!("Can't set `{field}` to `{self}` (expected type `{declared}`)")
            }
        };
        Err(Error::new(ErrorKind::TypeMismatch).with_message(msg))
    }
}

/// Which error wording a failed field-set uses: call arguments versus
/// request/result fields.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SetFlavor {
    Argument,
    Field,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
            Self::List(l) => write!(f, "<list of {}>", l.len()),
            Self::Struct(_) => f.write_str("<struct>"),
            Self::Capability(_) => f.write_str("<capability>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_matches_variant() {
        assert_eq!(Value::Int(3).type_of(), ValueType::Int);
        assert_eq!(Value::text("x").type_of(), ValueType::Text);
        assert_eq!(Value::Void.type_of(), ValueType::Void);
    }

    #[test]
    fn any_pointer_admits_everything() {
        assert!(ValueType::AnyPointer.admits(&Value::Int(1)));
        assert!(ValueType::AnyPointer.admits(&Value::text("hi")));
        assert!(!ValueType::Bool.admits(&Value::Int(1)));
    }

    #[test]
    fn mismatch_message_names_value_and_type() {
        let err = Value::Int(10)
            .check_against("j", ValueType::Bool, SetFlavor::Argument)
            .expect_err("expected mismatch");
        assert_eq!(
            err.message(),
            Some("Can't set argument `j` to `10` (expected type `BOOL`)")
        );

        let err = Value::text("foo")
            .check_against("i", ValueType::Int, SetFlavor::Field)
            .expect_err("expected mismatch");
        assert_eq!(
            err.message(),
            Some("Can't set `i` to `'foo'` (expected type `INT`)")
        );
    }

    #[test]
    fn struct_of_collects_entries() {
        let v = Value::struct_of([("a", Value::Int(1)), ("b", Value::Bool(true))]);
        let fields = v.as_struct().expect("struct");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["a"].as_int(), Some(1));
    }
}
