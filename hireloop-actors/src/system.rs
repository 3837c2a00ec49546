//! Actor task bookkeeping with a shared cancellation token.
//!
//! Every actor spawned through [`ActorSystem::spawn`] watches the same token;
//! [`ActorSystem::graceful_shutdown`] cancels it and waits for each task.
use crate::actor::{spawn_actor_with_shutdown, Actor, Addr};
use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct ActorSystem {
    joinset: JoinSet<Result<()>>,
    shutdown: CancellationToken,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Share an existing token, e.g. the runtime's.
    pub fn with_token(shutdown: CancellationToken) -> Self {
        Self {
            joinset: JoinSet::new(),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn `actor` and keep its task for shutdown.
    pub fn spawn<A: Actor>(&mut self, actor: A, capacity: usize) -> Addr<A> {
        let handle = spawn_actor_with_shutdown(actor, capacity, Some(self.shutdown.child_token()));
        self.joinset.spawn(async move {
            match handle.task.await {
                Ok(res) => res,
                Err(join) => Err(anyhow::anyhow!("actor task panicked: {join}")),
            }
        });
        handle.addr
    }

    pub fn track(&mut self, fut: impl std::future::Future<Output = Result<()>> + Send + 'static) {
        self.joinset.spawn(fut);
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Cancel everything and wait; the first task error is returned after all
    /// tasks have finished.
    pub async fn graceful_shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        let mut first_err = None;
        while let Some(res) = self.joinset.join_next().await {
            let outcome = match res {
                Ok(inner) => inner,
                Err(join) => Err(anyhow::anyhow!("tracked task panicked: {join}")),
            };
            if let Err(e) = outcome {
                tracing::warn!(error = ?e, "actors.shutdown.task_failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
