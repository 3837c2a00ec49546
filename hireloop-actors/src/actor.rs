use anyhow::Result;
use hireloop_common::HireloopError;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Minimal actor trait. `Self: Sized` avoids object-safety issues when using `Context<Self>`.
#[async_trait::async_trait]
pub trait Actor: Send + Sized + 'static {
    type Msg: Send + 'static;

    /// Handle a single message. Return `Err` to stop the actor.
    async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()>;
}

/// Runtime context for an actor instance.
pub struct Context<A: Actor> {
    addr: Addr<A>,
    pub stop: bool,
}

impl<A: Actor> Context<A> {
    /// Get a clone of this actor's `Addr`.
    ///
    /// ```
    /// # use anyhow::Result;
    /// # use async_trait::async_trait;
    /// # use hireloop_actors::actor::{self, Actor, Context};
    /// # struct SelfPing;
    /// # #[async_trait]
    /// # impl Actor for SelfPing {
    /// #     type Msg = u8;
    /// #     async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()> {
    /// #         if msg == 0 {
    /// #             ctx.addr().try_send(1).unwrap();
    /// #         } else {
    /// #             ctx.stop();
    /// #         }
    /// #         Ok(())
    /// #     }
    /// # }
    /// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    /// rt.block_on(async {
    ///     let actor::ActorHandle { addr, task } = actor::spawn_actor(SelfPing, 2);
    ///     addr.send(0).await.unwrap();
    ///     drop(addr);
    ///     task.await.unwrap().unwrap();
    /// });
    /// ```
    pub fn addr(&self) -> Addr<A> {
        self.addr.clone()
    }

    /// Request a graceful stop after processing the current message.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

/// Address for sending messages to an actor.
pub struct Addr<A: Actor>(mpsc::Sender<A::Msg>);

/// Manual Clone to avoid unnecessary bounds on `A`/`A::Msg`.
impl<A: Actor> Clone for Addr<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<A: Actor> Addr<A> {
    /// Async send; awaits backpressure. Returns the message if the receiver is dropped.
    pub async fn send(&self, msg: A::Msg) -> std::result::Result<(), A::Msg> {
        self.0.send(msg).await.map_err(|e| e.0)
    }

    /// Try to send without waiting. Returns the message if the mailbox is full or closed.
    pub fn try_send(&self, msg: A::Msg) -> std::result::Result<(), A::Msg> {
        self.0.try_send(msg).map_err(|e| e.into_inner())
    }

    /// Request/reply round trip over a oneshot channel.
    ///
    /// ```
    /// # use anyhow::Result;
    /// # use async_trait::async_trait;
    /// # use hireloop_actors::actor::{self, Actor, Context};
    /// # use tokio::sync::oneshot;
    /// struct Doubler;
    /// #[async_trait]
    /// impl Actor for Doubler {
    ///     type Msg = (u32, oneshot::Sender<u32>);
    ///     async fn handle(&mut self, (n, reply): Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
    ///         let _ = reply.send(n * 2);
    ///         Ok(())
    ///     }
    /// }
    /// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    /// rt.block_on(async {
    ///     let handle = actor::spawn_actor(Doubler, 4);
    ///     assert_eq!(handle.addr.ask(|tx| (21, tx)).await.unwrap(), 42);
    /// });
    /// ```
    pub async fn ask<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> A::Msg,
    ) -> std::result::Result<R, HireloopError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))
            .await
            .map_err(|_| HireloopError::Mailbox(std::any::type_name::<A>().to_string()))?;
        rx.await
            .map_err(|_| HireloopError::Mailbox(std::any::type_name::<A>().to_string()))
    }

    /// Bounded mailbox capacity.
    pub fn capacity(&self) -> usize {
        self.0.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Handle to a running actor task.
pub struct ActorHandle<A: Actor> {
    pub addr: Addr<A>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

/// Spawn an actor with a bounded mailbox.
///
/// Stop conditions:
/// - `handle` returns `Err`
/// - all senders are dropped
/// - `ctx.stop()` is called
pub fn spawn_actor<A: Actor>(actor: A, capacity: usize) -> ActorHandle<A> {
    spawn_actor_with_shutdown(actor, capacity, None)
}

/// Like [`spawn_actor`], but the loop also ends once `shutdown` is cancelled.
/// A message already being handled runs to completion.
pub fn spawn_actor_with_shutdown<A: Actor>(
    mut actor: A,
    capacity: usize,
    shutdown: Option<CancellationToken>,
) -> ActorHandle<A> {
    let (tx, mut rx) = mpsc::channel::<A::Msg>(capacity);
    let addr = Addr(tx);
    let addr_for_ctx = addr.clone();
    let shutdown = shutdown.unwrap_or_default();

    let task = tokio::spawn(async move {
        let mut ctx = Context {
            addr: addr_for_ctx,
            stop: false,
        };

        loop {
            let msg = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            if let Err(e) = actor.handle(msg, &mut ctx).await {
                tracing::error!(actor = std::any::type_name::<A>(), error = ?e, "actor.handle.failed");
                return Err(e);
            }
            if ctx.stop {
                break;
            }
        }
        Ok(())
    });

    ActorHandle { addr, task }
}
