//! Immutable call results.
//!
//! A [`Response`] is the read-only outcome of one call: named result
//! fields, including possibly-embedded capabilities. Cloning is cheap and
//! shares the underlying fields; nothing in a response can be mutated
//! after dispatch finalizes it.

use crate::client::Client;
use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The immutable result of one call.
#[derive(Debug, Clone)]
pub struct Response {
    fields: Arc<BTreeMap<String, Value>>,
}

impl Response {
    pub(crate) fn new(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields: Arc::new(fields),
        }
    }

    /// Returns a named result field.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::unknown_field(name))
    }

    /// Walks a field path into the response, descending through struct
    /// fields.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Result<&Value> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| Error::internal("empty pipeline field path"))?;
        let mut value = self.get(first.as_ref())?;
        for segment in rest {
            let fields = value
                .as_struct()
                .ok_or_else(|| Error::unknown_field(segment.as_ref()))?;
            value = fields
                .get(segment.as_ref())
                .ok_or_else(|| Error::unknown_field(segment.as_ref()))?;
        }
        Ok(value)
    }

    /// Returns an integer result field.
    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.get(name)?
            .as_int()
            .ok_or_else(|| wrong_type(name, "INT"))
    }

    /// Returns a boolean result field.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| wrong_type(name, "BOOL"))
    }

    /// Returns a text result field.
    pub fn get_text(&self, name: &str) -> Result<&str> {
        self.get(name)?
            .as_text()
            .ok_or_else(|| wrong_type(name, "TEXT"))
    }

    /// Returns a capability result field.
    pub fn get_capability(&self, name: &str) -> Result<Client> {
        self.get(name)?
            .as_capability()
            .cloned()
            .ok_or_else(|| wrong_type(name, "CAPABILITY"))
    }

    /// Iterates over the named result fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn wrong_type(name: &str, expected: &str) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("Field `{name}` is not of type `{expected}`."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Response {
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::text("26"));
        fields.insert(
            "outBox".to_string(),
            Value::struct_of([("n", Value::Int(5))]),
        );
        Response::new(fields)
    }

    #[test]
    fn typed_getters() {
        let response = sample();
        assert_eq!(response.get_text("x").unwrap(), "26");
        assert!(response.get_int("x").is_err());
    }

    #[test]
    fn missing_field_is_unknown() {
        let response = sample();
        assert_eq!(
            response.get("nope").unwrap_err().kind(),
            ErrorKind::UnknownField
        );
    }

    #[test]
    fn path_walks_structs() {
        let response = sample();
        assert_eq!(response.get_path(&["outBox", "n"]).unwrap().as_int(), Some(5));
        assert!(response.get_path(&["x", "n"]).is_err());
    }
}
