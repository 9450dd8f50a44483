//! Adapters turning user payloads into the uniform unit scheduled by a runner.
//!
//! Every payload is stored as a boxed closure producing a boxed future that
//! resolves to `anyhow::Result<()>`. Fire-and-forget payloads are wrapped so
//! that any observable value becomes an [`OrphanedReturn`]; tracked payloads
//! are wrapped so their outcome is delivered over a one-shot channel.

use std::{
    any::{Any, type_name},
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
};

use anyhow::anyhow;
use futures_util::{FutureExt, future::BoxFuture};
use tokio::sync::oneshot;

use crate::error::OrphanedReturn;

pub(crate) type PayloadFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A queued unit of work; calling it creates the future to schedule.
pub(crate) type Payload = Box<dyn FnOnce() -> PayloadFuture + Send>;

/// Receiver side of a tracked payload.
pub(crate) type Outcome<T> = oneshot::Receiver<anyhow::Result<T>>;

/// Wrap a fire-and-forget payload.
///
/// The payload must resolve to `()`; any other value is turned into an
/// [`OrphanedReturn`] failure, which the runner treats as fatal.
pub(crate) fn orphaned<F, Fut, T>(payload: F) -> Payload
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: fmt::Debug + Send + 'static,
{
    let who = type_name::<F>();
    Box::new(move || -> PayloadFuture {
        async move {
            let value = payload().await?;
            if (&value as &dyn Any).is::<()>() {
                Ok(())
            } else {
                Err(OrphanedReturn::new(who, format!("{value:?}")).into())
            }
        }
        .boxed()
    })
}

/// Wrap a tracked payload whose outcome is delivered to exactly one receiver.
///
/// Failures and panics are captured and sent to the receiver, so the wrapped
/// payload itself always completes successfully from the runner's view.
pub(crate) fn tracked<F, Fut, T>(payload: F) -> (Payload, Outcome<T>)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let wrapped: Payload = Box::new(move || -> PayloadFuture {
        async move {
            let outcome = AssertUnwindSafe(async move { payload().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("payload panicked: {}", panic_message(panic.as_ref()))));
            // the caller may have given up waiting; nothing else wants the outcome
            let _ = sender.send(outcome);
            Ok(())
        }
        .boxed()
    });
    (wrapped, receiver)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn orphaned_accepts_unit_results() {
        let payload = orphaned(|| async { Ok(()) });
        payload().await.expect("unit payload succeeds");
    }

    #[tokio::test]
    async fn orphaned_rejects_observable_values() {
        let payload = orphaned(|| async { Ok(Some("leftover")) });

        let error = payload().await.expect_err("value should be orphaned");
        let orphan = error.downcast_ref::<OrphanedReturn>().expect("orphaned return");
        assert_eq!(orphan.value, "Some(\"leftover\")");
        assert!(!orphan.who.is_empty());
    }

    #[tokio::test]
    async fn orphaned_propagates_failures_unchanged() {
        let payload = orphaned(|| async { Err::<(), _>(anyhow!("boom")) });

        let error = payload().await.expect_err("failure propagates");
        assert!(error.downcast_ref::<OrphanedReturn>().is_none());
        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn tracked_delivers_value_and_failure() {
        let (payload, outcome) = tracked(|| async { Ok(7_u32) });
        payload().await.expect("wrapper succeeds");
        assert_eq!(outcome.await.expect("outcome sent").expect("payload value"), 7);

        let (payload, outcome) = tracked(|| async { Err::<u32, _>(anyhow!("isolated")) });
        payload().await.expect("wrapper succeeds even when payload fails");
        let error = outcome.await.expect("outcome sent").expect_err("payload failure");
        assert_eq!(error.to_string(), "isolated");
    }

    #[tokio::test]
    async fn tracked_captures_panics() {
        let (payload, outcome) = tracked(|| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        payload().now_or_never().expect("completes immediately").expect("wrapper succeeds");

        let error = outcome.await.expect("outcome sent").expect_err("panic delivered");
        assert!(error.to_string().contains("kaboom"), "unexpected: {error}");
    }
}
