use crate::actor::{Actor, Addr, Context};
use anyhow::Result;
use hireloop_common::HireloopError;
use std::{collections::HashMap, time::Duration};
use tokio::{
    sync::oneshot,
    time::{sleep, Instant},
};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateKey(pub String);

impl RateKey {
    pub fn completion() -> Self {
        RateKey("llm:completion".into())
    }
}

#[derive(Debug)]
pub enum RateMsg {
    /// Insert/update bucket config.
    Upsert { key: RateKey, qps: f64, burst: u32 },
    /// Acquire `cost` tokens; replies when allowed.
    Acquire {
        key: RateKey,
        cost: u32,
        reply: oneshot::Sender<RatePermit>,
    },
}

#[derive(Debug)]
pub struct RatePermit;

/// Token-bucket rate limiter as an actor.
///
/// - `Upsert` creates or updates the bucket for a `RateKey`. A `qps` of zero
///   (or below) turns the bucket into a pass-through.
/// - `Acquire` waits (off-actor) until `cost` tokens are available, then replies.
///
/// Unknown keys get a 1 qps / burst 1 bucket on first use.
#[derive(Clone, Copy, Debug)]
struct BucketCfg {
    qps: f64,
    burst: f64,
}

#[derive(Debug)]
struct BucketState {
    cfg: BucketCfg,
    tokens: f64,
    last: Instant,
}

impl BucketState {
    fn new(cfg: BucketCfg, now: Instant) -> Self {
        Self {
            cfg,
            tokens: cfg.burst,
            last: now,
        }
    }

    /// Returns wait time needed to have `need` tokens available (0 if ready).
    fn needed_wait(&mut self, need: f64, now: Instant) -> Duration {
        if !(self.cfg.qps > 0.0) || !self.cfg.qps.is_finite() {
            return Duration::ZERO;
        }

        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + dt * self.cfg.qps).min(self.cfg.burst);

        // The reservation may push the balance negative so queued callers
        // line up behind each other instead of waking together.
        self.tokens -= need;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.cfg.qps)
        }
    }
}

pub struct RateLimiter {
    buckets: HashMap<RateKey, BucketState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    fn upsert(&mut self, key: RateKey, qps: f64, burst: u32) {
        let cfg = BucketCfg {
            qps,
            burst: f64::from(burst.max(1)),
        };
        let now = Instant::now();
        self.buckets
            .entry(key)
            .and_modify(|b| b.cfg = cfg)
            .or_insert_with(|| BucketState::new(cfg, now));
    }
}

#[async_trait::async_trait]
impl Actor for RateLimiter {
    type Msg = RateMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            RateMsg::Upsert { key, qps, burst } => {
                tracing::debug!(key = %key.0, qps, burst, "rate.upsert");
                self.upsert(key, qps, burst);
            }
            RateMsg::Acquire { key, cost, reply } => {
                let now = Instant::now();
                let state = self.buckets.entry(key.clone()).or_insert_with(|| {
                    BucketState::new(
                        BucketCfg {
                            qps: 1.0,
                            burst: 1.0,
                        },
                        now,
                    )
                });
                let wait = state.needed_wait(f64::from(cost), now);
                if wait.is_zero() {
                    let _ = reply.send(RatePermit);
                    return Ok(());
                }
                tracing::trace!(key = %key.0, wait_ms = wait.as_millis() as u64, "rate.acquire.delayed");
                // Do not block the actor; wait and reply in a detached task.
                let mut reply = reply;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = sleep(wait) => {}
                        _ = reply.closed() => return,
                    }
                    let _ = reply.send(RatePermit);
                });
            }
        }
        Ok(())
    }
}

/// Wait for one permit on `key`.
pub async fn acquire_permit(
    limiter: &Addr<RateLimiter>,
    key: &RateKey,
) -> std::result::Result<RatePermit, HireloopError> {
    limiter
        .ask(|reply| RateMsg::Acquire {
            key: key.clone(),
            cost: 1,
            reply,
        })
        .await
}
