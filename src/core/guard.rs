//! Isolation of caller-supplied callbacks run inside a tick.

use std::panic::{self, AssertUnwindSafe};

/// Run `f`, containing a panic when `isolate` is set.
///
/// Returns `None` if the callback panicked. The panic is logged and the
/// caller carries on with the rest of the tick.
pub(crate) fn invoke<R>(isolate: bool, what: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    if !isolate {
        return Some(f());
    }
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            tracing::error!(callback = what, %message, "callback panicked; continuing tick");
            None
        }
    }
}
