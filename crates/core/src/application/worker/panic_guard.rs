// Panic isolation for backend calls
use crate::port::BackendError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Run a backend call, turning a panic into `BackendError::Panicked`
///
/// A worker that claimed a unit must always report an outcome; a panicking
/// backend would otherwise take the worker down and leave the dispatcher
/// waiting forever.
pub async fn guard_backend_call<F>(call: F) -> Result<(), BackendError>
where
    F: Future<Output = Result<(), BackendError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = panic_message(panic_info.as_ref());
            error!(panic_msg = %panic_msg, "Backend call panicked");
            Err(BackendError::Panicked(panic_msg))
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
