//! Process runtime for the hireloop binaries: a Tokio runtime paired with
//! the cancellation token every long-lived task watches.
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct HireloopHandle {
    inner: Handle,
    cancel: CancellationToken,
}

pub struct HireloopRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl HireloopRuntime {
    /// Build a current-thread runtime; every task of the process shares the
    /// calling thread.
    ///
    /// ```
    /// use hireloop_runtime::HireloopRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = HireloopRuntime::new().expect("runtime builds");
    /// assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> HireloopHandle {
        HireloopHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel outstanding work and give tasks `graceful` to wind down.
    ///
    /// ```
    /// use hireloop_runtime::HireloopRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = HireloopRuntime::new().unwrap();
    /// let token = runtime.cancellation();
    /// runtime.shutdown(Duration::from_millis(5));
    /// assert!(token.is_cancelled());
    /// ```
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl HireloopHandle {
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the shared token on the first Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        self.inner.spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::warn!(error = %e, "runtime.ctrl_c.unavailable");
                        return;
                    }
                    tracing::info!("runtime.ctrl_c");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_shares_the_runtime_token() {
        let runtime = HireloopRuntime::new().unwrap();
        let handle = runtime.handle();
        let task = handle.spawn(async { 21 * 2 });
        assert_eq!(runtime.block_on(async move { task.await.unwrap() }), 42);

        handle.cancellation().cancel();
        assert!(runtime.cancellation().is_cancelled());
        runtime.shutdown(Duration::from_millis(10));
    }

    #[test]
    fn ctrl_c_watcher_exits_with_the_token() {
        let runtime = HireloopRuntime::new().unwrap();
        let handle = runtime.handle();
        let watcher = handle.cancel_on_ctrl_c();
        handle.cancellation().cancel();
        runtime.block_on(async move { watcher.await.unwrap() });
    }
}
