use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::HttpResponse;

/// Run `effect` on an independent copy of `response`. Errors and panics
/// from the effect stop here; the caller keeps the original untouched.
pub fn tap<F, E>(response: &HttpResponse, effect: F)
where
    F: FnOnce(HttpResponse) -> Result<(), E>,
    E: Display,
{
    let copy = response.clone();
    match catch_unwind(AssertUnwindSafe(move || effect(copy))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, "response tap side effect failed"),
        Err(_) => tracing::debug!("response tap side effect panicked"),
    }
}
