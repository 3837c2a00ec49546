use crate::RunArgs;
use anyhow::{anyhow, Context, Result};
use hireloop_actors::{
    keys, spawn_actor, ActorSystem, RateKey, RateLimiter, RateMsg, StoreActor, StoreHandle,
};
use hireloop_config::{HireloopConfig, RunSettings, SubmissionMode};
use hireloop_core::{
    ConfigClientFactory, ControlActor, ControlHandle, ControlParts, EventBus, ResourceTracker,
    Severity, StatusEvent, SystemClock, TrackerConfig, UserPreferences, UserProfile,
};
use hireloop_drivers::WebDriverSurface;
use hireloop_runtime::HireloopHandle;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

async fn open_store(config: &HireloopConfig) -> Result<StoreHandle> {
    let actor = StoreActor::connect(&config.store.database_url).await?;
    Ok(StoreHandle::new(spawn_actor(actor, 64).addr))
}

fn settings_from(config: &HireloopConfig, args: &RunArgs) -> RunSettings {
    let base = config.run;
    RunSettings {
        confidence_threshold: args.threshold.unwrap_or(base.confidence_threshold),
        apply_delay_seconds: args.apply_delay.unwrap_or(base.apply_delay_seconds),
        search_delay_seconds: args.search_delay.unwrap_or(base.search_delay_seconds),
        max_applications: args.max_applications.unwrap_or(base.max_applications),
    }
    .normalized()
}

pub async fn run(mut config: HireloopConfig, args: RunArgs, rt: HireloopHandle) -> Result<()> {
    if args.live {
        config.submission_mode = SubmissionMode::Live;
    }
    let settings = settings_from(&config, &args);
    let config = Arc::new(config);

    // Actors outlive the run; Ctrl-C only cancels the run itself.
    let mut system = ActorSystem::new();
    let store = StoreHandle::new(system.spawn(StoreActor::connect(&config.store.database_url).await?, 256));

    let limiter = if config.llm.qps > 0.0 {
        let addr = system.spawn(RateLimiter::new(), 256);
        addr.send(RateMsg::Upsert {
            key: RateKey::completion(),
            qps: config.llm.qps,
            burst: config.llm.burst,
        })
        .await
        .map_err(|_| anyhow!("rate limiter stopped before configuration"))?;
        Some(addr)
    } else {
        None
    };

    let surface = Arc::new(
        WebDriverSurface::connect(&config.browser)
            .await
            .with_context(|| format!("cannot reach WebDriver at {}", config.browser.webdriver_url))?,
    );
    let tracker = ResourceTracker::new(
        surface.clone(),
        Arc::new(SystemClock),
        TrackerConfig::from_config(&config),
    );
    let events = EventBus::new(config.orchestrator.event_buffer);

    let control = ControlHandle::new(system.spawn(
        ControlActor::new(
            ControlParts {
                config: config.clone(),
                surface: surface.clone(),
                tracker: tracker.clone(),
                store,
                events,
                limiter,
                factory: Arc::new(ConfigClientFactory::new(config.llm.provider.clone())),
            },
            rt.cancellation(),
        ),
        64,
    ));

    let printer_done = CancellationToken::new();
    let printer = tokio::spawn(print_events(control.subscribe().await?, printer_done.clone()));
    let ctrl_c = rt.cancel_on_ctrl_c();

    let outcome = match control.start(settings).await {
        Ok(run_id) => {
            info!(%run_id, "app.run.started");
            control.wait_for_stop(run_id).await.map_err(Into::into)
        }
        Err(e) => Err(anyhow::Error::new(e).context("run did not start")),
    };

    printer_done.cancel();
    if let Err(e) = printer.await {
        warn!(error = %e, "app.printer.join_failed");
    }
    ctrl_c.abort();

    let closed = control.reset_resources().await.unwrap_or_default();
    info!(closed, "app.tabs.closed");
    drop(control);
    drop(tracker);
    system.graceful_shutdown().await?;

    match Arc::try_unwrap(surface) {
        Ok(surface) => {
            if let Err(e) = surface.shutdown().await {
                warn!(error = %e, "app.surface.shutdown_failed");
            }
        }
        Err(_) => warn!("app.surface.still_shared"),
    }

    let status = outcome?;
    println!(
        "{} iterations, {} new listings, {} evaluated, {} applied ({:?})",
        status.iteration,
        status.new_listings,
        status.evaluated,
        status.applied,
        status.outcome
    );
    Ok(())
}

async fn print_events(mut rx: Receiver<StatusEvent>, done: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "app.events.lagged"),
                Err(RecvError::Closed) => return,
            },
            _ = done.cancelled() => break,
        }
    }
    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &StatusEvent) {
    let marker = match event.severity {
        Severity::Info => " ",
        Severity::Success => "+",
        Severity::Warning => "!",
        Severity::Error => "x",
    };
    println!(
        "{} [{marker}] {}",
        event.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
        event.message
    );
}

pub async fn set_credential(config: &HireloopConfig, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("credential must not be blank");
    }
    let store = open_store(config).await?;
    store.set_string(keys::API_CREDENTIAL, key).await?;
    println!("credential stored");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

pub async fn set_profile(config: &HireloopConfig, file: &Path, resume: Option<&Path>) -> Result<()> {
    let mut profile: UserProfile = read_json(file)?;
    if let Some(resume) = resume {
        profile.resume_text = std::fs::read_to_string(resume)
            .with_context(|| format!("cannot read {}", resume.display()))?;
    }
    let store = open_store(config).await?;
    store.set_json(keys::USER_PROFILE, &profile).await?;
    println!(
        "profile stored for {} ({} skills, resume {} chars)",
        if profile.full_name.is_empty() { "unnamed applicant" } else { &profile.full_name },
        profile.skills.len(),
        profile.resume_text.chars().count()
    );
    Ok(())
}

pub async fn set_preferences(config: &HireloopConfig, file: &Path) -> Result<()> {
    let prefs: UserPreferences = read_json(file)?;
    if prefs.keywords.trim().is_empty() {
        warn!("app.preferences.no_keywords");
        println!("warning: no keywords set, searches will be skipped");
    }
    let store = open_store(config).await?;
    store.set_json(keys::USER_PREFERENCES, &prefs).await?;
    println!("preferences stored");
    Ok(())
}

pub async fn stats(config: &HireloopConfig) -> Result<()> {
    let store = open_store(config).await?;
    let applied = store.get_counter(keys::APPLICATION_COUNTER).await;
    let processed = store.processed_count().await;
    let last_search = store.get_string(keys::LAST_SEARCH_URL).await;
    let credential = store
        .get_string(keys::API_CREDENTIAL)
        .await
        .is_some_and(|k| !k.trim().is_empty());

    println!("applications submitted: {applied}");
    println!("listings evaluated:     {processed}");
    println!("last search:            {}", last_search.as_deref().unwrap_or("-"));
    println!("credential stored:      {}", if credential { "yes" } else { "no" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            threshold: None,
            apply_delay: None,
            search_delay: Some(30),
            max_applications: None,
            live: false,
        }
    }

    #[test]
    fn flags_override_config_settings() {
        let config = HireloopConfig::default();
        let s = settings_from(&config, &args());
        assert_eq!(s.search_delay_seconds, 30);
        assert_eq!(s.max_applications, config.run.max_applications);

        let s = settings_from(
            &config,
            &RunArgs {
                threshold: Some(4.0),
                ..args()
            },
        );
        assert_eq!(s.confidence_threshold, 1.0);
    }
}
