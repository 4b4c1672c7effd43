//! Graceful degradation for fallible operations.
//!
//! [`ErrorBoundary::execute`] runs an operation and, whatever happens,
//! produces a value: the operation's own result on success, or the caller's
//! fallback after the failure has been converted into an [`Error`] and handed
//! to the installed [`ErrorHandler`]. Panics inside the operation are caught
//! and treated the same way as returned errors.

use crate::error::{Error, ErrorCode, Severity};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Receives every error caught by a boundary.
pub trait ErrorHandler: Send + Sync {
    /// Observe a caught error.
    fn handle(&self, error: &Error);
}

impl<F> ErrorHandler for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn handle(&self, error: &Error) {
        self(error);
    }
}

/// Default handler: logs through `tracing` at a level derived from severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ErrorHandler for LoggingHandler {
    fn handle(&self, err: &Error) {
        let ctx = err.context();
        let operation = ctx.operation.as_deref().unwrap_or("-");
        let document = ctx.document_id.as_deref().unwrap_or("-");
        match err.severity() {
            Severity::Low => debug!(code = %err.code(), operation, document, "{err}"),
            Severity::Medium => warn!(code = %err.code(), operation, document, "{err}"),
            Severity::High | Severity::Critical => {
                error!(code = %err.code(), operation, document, "{err}");
            },
        }
    }
}

/// Names the guarded operation for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryContext {
    operation: String,
    document_id: Option<String>,
}

impl BoundaryContext {
    /// Context for the named operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            document_id: None,
        }
    }

    /// Attach the document being processed.
    #[must_use]
    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// Converts failures into a handled side effect plus a fallback value.
#[derive(Clone)]
pub struct ErrorBoundary {
    handler: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary").finish_non_exhaustive()
    }
}

impl Default for ErrorBoundary {
    fn default() -> Self {
        Self::new(LoggingHandler)
    }
}

impl ErrorBoundary {
    /// Boundary reporting to `handler`.
    pub fn new(handler: impl ErrorHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Hand an already-structured error to the handler.
    pub fn report(&self, err: &Error) {
        self.handler.handle(err);
    }

    /// Run `operation`; on any failure report it and return `fallback()`.
    ///
    /// Never fails and never unwinds. Failures are observable only through
    /// the handler and through the returned fallback value.
    pub async fn execute<T, E, F, Fut, Fb>(
        &self,
        operation: F,
        fallback: Fb,
        context: BoundaryContext,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
        Fb: FnOnce() -> T,
    {
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(operation)) {
            Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result.map_err(|e| Error::from_any(e.into())),
                Err(payload) => Err(panic_error(payload.as_ref())),
            },
            Err(payload) => Err(panic_error(payload.as_ref())),
        };

        match outcome {
            Ok(value) => value,
            Err(err) => {
                let err = err.or_context(&context.operation, context.document_id.as_deref());
                self.handler.handle(&err);
                fallback()
            },
        }
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> Error {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    Error::new(ErrorCode::Unknown, format!("operation panicked: {detail}"))
        .with_retryable(false)
        .with_original(detail)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_boundary() -> (ErrorBoundary, Arc<Mutex<Vec<Error>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let boundary = ErrorBoundary::new(move |err: &Error| {
            sink.lock().unwrap().push(err.clone());
        });
        (boundary, seen)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let (boundary, seen) = recording_boundary();
        let value = boundary
            .execute(
                || async { Ok::<_, Error>(7) },
                || 0,
                BoundaryContext::new("count"),
            )
            .await;

        assert_eq!(value, 7);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_docs_error_is_preserved_and_contextualized() {
        // Given: An operation failing with a structured error
        let (boundary, seen) = recording_boundary();

        // When: Executing it behind the boundary
        let value = boundary
            .execute(
                || async { Err::<String, _>(Error::network("reset", None)) },
                String::new,
                BoundaryContext::new("load_document").document("intro"),
            )
            .await;

        // Then: Fallback returned, original code kept, context filled in
        assert_eq!(value, "");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].code(), ErrorCode::NetworkError);
        assert_eq!(seen[0].context().operation.as_deref(), Some("load_document"));
        assert_eq!(seen[0].context().document_id.as_deref(), Some("intro"));
    }

    #[tokio::test]
    async fn test_foreign_error_becomes_unknown() {
        let (boundary, seen) = recording_boundary();
        let value: Vec<u8> = boundary
            .execute(
                || async { Err(std::io::Error::other("pipe broke")) },
                Vec::new,
                BoundaryContext::new("read"),
            )
            .await;

        assert!(value.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].code(), ErrorCode::Unknown);
        assert_eq!(seen[0].user_message(), ErrorCode::Unknown.user_message());
        assert!(seen[0].context().original.as_deref().unwrap().contains("pipe broke"));
    }

    #[tokio::test]
    async fn test_async_panic_is_caught() {
        let (boundary, seen) = recording_boundary();
        let value = boundary
            .execute(
                || async {
                    if true {
                        panic!("async boom");
                    }
                    Ok::<_, Error>(1)
                },
                || -1,
                BoundaryContext::new("panicky"),
            )
            .await;

        assert_eq!(value, -1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].code(), ErrorCode::Unknown);
        assert!(seen[0].message().contains("async boom"));
    }

    #[tokio::test]
    async fn test_sync_panic_before_future_is_caught() {
        let (boundary, seen) = recording_boundary();
        let value = boundary
            .execute(
                || -> std::future::Ready<Result<i32, Error>> { panic!("sync boom") },
                || 42,
                BoundaryContext::new("eager"),
            )
            .await;

        assert_eq!(value, 42);
        assert!(seen.lock().unwrap()[0].message().contains("sync boom"));
    }

    #[tokio::test]
    async fn test_report_forwards_to_handler() {
        let (boundary, seen) = recording_boundary();
        boundary.report(&Error::document_not_found("x"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
