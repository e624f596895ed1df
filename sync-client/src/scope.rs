//! Application-lifetime task scope.
//!
//! Writes promoted to the scope run as detached tasks. The caller awaits the
//! task's handle, so dropping the caller's future leaves the write running to
//! completion.

use std::future::Future;
use stride_sync_types::LocalError;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Scope for work that must outlive its caller.
#[derive(Debug, Clone)]
pub struct AppScope {
    handle: Handle,
}

impl AppScope {
    /// Scope on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scope on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Fire-and-forget work.
    pub fn launch<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run work in the scope and wait for its result.
    ///
    /// A panic in the work is resumed on the caller. Work cancelled by the
    /// runtime shutting down reports [`LocalError::Interrupted`].
    pub async fn run<F, T>(&self, future: F) -> Result<T, LocalError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self.launch(future).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(LocalError::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn run_returns_value() {
        let scope = AppScope::current();
        assert_eq!(scope.run(async { 41 + 1 }).await, Ok(42));
    }

    #[tokio::test]
    async fn work_survives_cancelled_caller() {
        let scope = AppScope::current();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let caller = tokio::spawn({
            let scope = scope.clone();
            async move {
                scope
                    .run(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        flag.store(true, Ordering::SeqCst);
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn panic_is_resumed_on_caller() {
        let scope = AppScope::current();
        let _ = scope.run(async { panic!("boom") }).await;
    }
}
