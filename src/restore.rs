//! Legacy capability restoration.
//!
//! A [`Restorer`] maps persistent reference identifiers to live clients.
//! The mechanism is deprecated in favor of handing out capabilities as
//! bootstrap or as call results; every restoration logs a deprecation
//! warning so lingering uses stay visible.

use crate::client::Client;
use crate::error::Result;
use crate::value::Value;

/// Maps a persistent reference identifier to a live capability.
pub trait Restorer: Send + Sync {
    /// Restores the capability named by `ref_id`.
    fn restore(&self, ref_id: &Value) -> Result<Client>;
}

/// Restores a client through a [`Restorer`], logging the deprecation
/// warning once per invocation.
pub fn restore_client(restorer: &dyn Restorer, ref_id: &Value) -> Result<Client> {
    tracing::warn!(
        "Restorers are deprecated. Hand out capabilities directly as bootstrap \
         or call results instead."
    );
    restorer.restore(ref_id)
}
