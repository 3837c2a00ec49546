//! Control actor: start and stop runs, manage tabs, expose status.
use crate::events::{EventBus, StatusEvent};
use crate::runloop::{LoopDeps, RunLoop, RunOutcome, RunState, RunStatus};
use crate::tracker::{ResourceTracker, TabResource};
use anyhow::Result;
use async_trait::async_trait;
use hireloop_actors::{keys, Actor, Addr, Context, RateLimiter, StoreHandle};
use hireloop_common::HireloopError;
use hireloop_config::{HireloopConfig, LlmConfig, RunSettings, SubmissionMode};
use hireloop_drivers::PageSurface;
use hireloop_llm::SharedCompletionClient;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Builds the completion client for a run from the stored credential.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, credential: Option<String>) -> Result<SharedCompletionClient>;
}

/// Uses the `llm` section of the config; a stored credential overrides its
/// token.
pub struct ConfigClientFactory {
    llm: LlmConfig,
}

impl ConfigClientFactory {
    pub fn new(llm: LlmConfig) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ClientFactory for ConfigClientFactory {
    async fn build(&self, credential: Option<String>) -> Result<SharedCompletionClient> {
        hireloop_llm::ensure_llm_ready(&self.llm, credential.as_deref()).await
    }
}

pub enum ControlMsg {
    Start {
        settings: RunSettings,
        reply: oneshot::Sender<hireloop_common::Result<Uuid>>,
    },
    Stop {
        reply: oneshot::Sender<hireloop_common::Result<()>>,
    },
    SetCredential {
        key: String,
        reply: oneshot::Sender<hireloop_common::Result<()>>,
    },
    GetStatus {
        reply: oneshot::Sender<RunStatus>,
    },
    ListResources {
        reply: oneshot::Sender<Vec<TabResource>>,
    },
    CloseResource {
        id: String,
        reply: oneshot::Sender<hireloop_common::Result<()>>,
    },
    ResetResources {
        reply: oneshot::Sender<usize>,
    },
    SetSubmissionMode {
        mode: SubmissionMode,
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<StatusEvent>>,
    },
    WatchStatus {
        reply: oneshot::Sender<watch::Receiver<RunStatus>>,
    },
}

/// Collaborators shared by every run.
pub struct ControlParts {
    pub config: Arc<HireloopConfig>,
    pub surface: Arc<dyn PageSurface>,
    pub tracker: ResourceTracker,
    pub store: StoreHandle,
    pub events: EventBus,
    pub limiter: Option<Addr<RateLimiter>>,
    pub factory: Arc<dyn ClientFactory>,
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

pub struct ControlActor {
    parts: ControlParts,
    mode: watch::Sender<SubmissionMode>,
    status: Arc<watch::Sender<RunStatus>>,
    shutdown: CancellationToken,
    active: Option<ActiveRun>,
}

impl ControlActor {
    /// Runs started by this actor are cancelled along with `shutdown`.
    pub fn new(parts: ControlParts, shutdown: CancellationToken) -> Self {
        let (mode, _) = watch::channel(parts.config.submission_mode);
        let (status, _) = watch::channel(RunStatus::default());
        Self {
            parts,
            mode,
            status: Arc::new(status),
            shutdown,
            active: None,
        }
    }

    fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|run| !run.task.is_finished())
    }

    async fn start(&mut self, settings: RunSettings) -> hireloop_common::Result<Uuid> {
        if self.is_running() {
            return Err(HireloopError::AlreadyRunning);
        }
        let credential = self
            .parts
            .store
            .get_string(keys::API_CREDENTIAL)
            .await
            .filter(|k| !k.trim().is_empty());
        let client = self
            .parts
            .factory
            .build(credential)
            .await
            .map_err(|e| HireloopError::Config(format!("{e:#}")))?;

        let cancel = self.shutdown.child_token();
        let deps = LoopDeps {
            config: self.parts.config.clone(),
            surface: self.parts.surface.clone(),
            tracker: self.parts.tracker.clone(),
            client,
            limiter: self.parts.limiter.clone(),
            store: self.parts.store.clone(),
            events: self.parts.events.clone(),
            mode: self.mode.subscribe(),
            status: self.status.clone(),
        };
        let run = RunLoop::new(deps, settings, cancel.clone()).await;
        let run_id = run.run_id();
        self.status.send_modify(|s| {
            *s = RunStatus {
                state: RunState::Running,
                run_id: Some(run_id),
                ..RunStatus::default()
            }
        });
        let task = tokio::spawn(run.run());
        self.active = Some(ActiveRun { cancel, task });
        info!(%run_id, "control.start");
        Ok(run_id)
    }

    fn stop(&mut self) -> hireloop_common::Result<()> {
        match &self.active {
            Some(run) if !run.task.is_finished() => {
                run.cancel.cancel();
                info!("control.stop");
                Ok(())
            }
            _ => Err(HireloopError::NotRunning),
        }
    }
}

#[async_trait]
impl Actor for ControlActor {
    type Msg = ControlMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        let delivered = match msg {
            ControlMsg::Start { settings, reply } => reply.send(self.start(settings).await).is_ok(),
            ControlMsg::Stop { reply } => reply.send(self.stop()).is_ok(),
            ControlMsg::SetCredential { key, reply } => {
                let res = self
                    .parts
                    .store
                    .set_string(keys::API_CREDENTIAL, key.trim())
                    .await;
                if res.is_ok() {
                    info!("control.credential.updated");
                }
                reply.send(res).is_ok()
            }
            ControlMsg::GetStatus { reply } => {
                let status = self.status.borrow().clone();
                reply.send(status).is_ok()
            }
            ControlMsg::ListResources { reply } => reply.send(self.parts.tracker.list()).is_ok(),
            ControlMsg::CloseResource { id, reply } => {
                let res = self.parts.tracker.release(&id).await.map(|_| ());
                reply.send(res).is_ok()
            }
            ControlMsg::ResetResources { reply } => {
                reply.send(self.parts.tracker.reset().await).is_ok()
            }
            ControlMsg::SetSubmissionMode { mode, reply } => {
                self.mode.send_replace(mode);
                info!(?mode, "control.submission_mode");
                reply.send(()).is_ok()
            }
            ControlMsg::Subscribe { reply } => reply.send(self.parts.events.subscribe()).is_ok(),
            ControlMsg::WatchStatus { reply } => reply.send(self.status.subscribe()).is_ok(),
        };
        if !delivered {
            warn!("control.reply_dropped");
        }
        Ok(())
    }
}

/// Cloneable request/reply front for [`ControlActor`].
#[derive(Clone)]
pub struct ControlHandle {
    addr: Addr<ControlActor>,
}

impl ControlHandle {
    pub fn new(addr: Addr<ControlActor>) -> Self {
        Self { addr }
    }

    pub async fn start(&self, settings: RunSettings) -> hireloop_common::Result<Uuid> {
        self.addr
            .ask(|reply| ControlMsg::Start { settings, reply })
            .await?
    }

    pub async fn stop(&self) -> hireloop_common::Result<()> {
        self.addr.ask(|reply| ControlMsg::Stop { reply }).await?
    }

    pub async fn set_credential(&self, key: &str) -> hireloop_common::Result<()> {
        self.addr
            .ask(|reply| ControlMsg::SetCredential {
                key: key.to_string(),
                reply,
            })
            .await?
    }

    pub async fn get_status(&self) -> hireloop_common::Result<RunStatus> {
        self.addr.ask(|reply| ControlMsg::GetStatus { reply }).await
    }

    pub async fn list_resources(&self) -> hireloop_common::Result<Vec<TabResource>> {
        self.addr.ask(|reply| ControlMsg::ListResources { reply }).await
    }

    pub async fn close_resource(&self, id: &str) -> hireloop_common::Result<()> {
        self.addr
            .ask(|reply| ControlMsg::CloseResource {
                id: id.to_string(),
                reply,
            })
            .await?
    }

    pub async fn reset_resources(&self) -> hireloop_common::Result<usize> {
        self.addr.ask(|reply| ControlMsg::ResetResources { reply }).await
    }

    pub async fn set_submission_mode(&self, mode: SubmissionMode) -> hireloop_common::Result<()> {
        self.addr
            .ask(|reply| ControlMsg::SetSubmissionMode { mode, reply })
            .await
    }

    pub async fn subscribe(&self) -> hireloop_common::Result<broadcast::Receiver<StatusEvent>> {
        self.addr.ask(|reply| ControlMsg::Subscribe { reply }).await
    }

    pub async fn watch_status(&self) -> hireloop_common::Result<watch::Receiver<RunStatus>> {
        self.addr.ask(|reply| ControlMsg::WatchStatus { reply }).await
    }

    /// Wait until run `run_id` has stopped and return its final status.
    pub async fn wait_for_stop(&self, run_id: Uuid) -> hireloop_common::Result<RunStatus> {
        let mut rx = self.watch_status().await?;
        let status = rx
            .wait_for(|s| s.run_id == Some(run_id) && s.state == RunState::Stopped)
            .await
            .map_err(|_| HireloopError::Mailbox("run status".into()))?;
        Ok(status.clone())
    }
}
