// ── Workers ──
//
// Per-tenant tokio tasks that own all provider I/O. The facade talks to
// them only through boundary types; provider failures and panics are
// caught here and turned into `WireError` data.

pub mod cache;
pub mod command;
pub mod event;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::boundary::WireError;

pub use command::CommandWorker;
pub use event::EventWorker;

/// Run a provider call, converting a panic into an `Internal` failure.
pub(crate) async fn guarded<F, T>(operation: &'static str, call: F) -> Result<T, WireError>
where
    F: Future<Output = Result<T, WireError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(operation, message = %message, "provider call panicked");
            Err(WireError::internal(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "provider call panicked".into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::boundary::WireErrorKind;

    #[tokio::test]
    async fn panics_become_internal_failures() {
        let result: Result<(), WireError> =
            guarded("explode", async { panic!("wires crossed") }).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, WireErrorKind::Internal);
        assert_eq!(err.message, "wires crossed");
    }

    #[tokio::test]
    async fn ordinary_results_pass_through() {
        let ok = guarded("noop", async { Ok::<_, WireError>(5) }).await;
        assert_eq!(ok, Ok(5));
    }
}
