//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Every section of `hireloop.yaml` is optional; missing keys fall back to the
//! defaults documented on each struct. Sources are merged in the order they
//! are attached, then `HIRELOOP__SECTION__KEY` environment variables win over
//! all files. String values may reference other variables as `${VAR}`; the
//! expansion is applied recursively up to a fixed depth.
use config::{Config, ConfigError, Environment, File};
use hireloop_common::{HireloopError, LogFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod site;

pub use site::{SiteProfile, SiteSelectors};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "HIRELOOP";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HireloopConfig {
    pub version: Option<String>,
    pub llm: LlmSection,
    pub browser: BrowserConfig,
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
    pub run: RunSettings,
    pub logging: LoggingConfig,
    pub submission_mode: SubmissionMode,
}

impl HireloopConfig {
    /// Reject values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<(), HireloopError> {
        let o = &self.orchestrator;
        if o.prescreen_batch_size == 0 {
            return Err(HireloopError::Config(
                "orchestrator.prescreen_batch_size must be at least 1".into(),
            ));
        }
        if o.max_plan_steps == 0 {
            return Err(HireloopError::Config(
                "orchestrator.max_plan_steps must be at least 1".into(),
            ));
        }
        if o.event_buffer == 0 {
            return Err(HireloopError::Config(
                "orchestrator.event_buffer must be at least 1".into(),
            ));
        }
        if !(self.llm.qps >= 0.0) {
            return Err(HireloopError::Config("llm.qps must be non-negative".into()));
        }
        if self.browser.site.host.trim().is_empty() {
            return Err(HireloopError::Config("browser.site.host is empty".into()));
        }
        Ok(())
    }
}

/// Completion provider plus the client-side rate limit applied to it.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(flatten)]
    pub provider: LlmConfig,
    /// Sustained completion calls per second. `0` disables the limiter.
    #[serde(default = "default_qps")]
    pub qps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmConfig::default(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    Openai {
        model: String,
        /// Falls back to the `api_credential` stored by `set-credential`.
        #[serde(default)]
        auth_token: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
    },
    Ollama {
        model: String,
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig::Openai {
            model: "gpt-4o-mini".into(),
            auth_token: None,
            temperature: Some(0.2),
            max_tokens: Some(600),
            endpoint: default_openai_endpoint(),
        }
    }
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_qps() -> f64 {
    1.0
}
fn default_burst() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    /// Type search terms key by key with human-like pauses.
    pub human_typing: bool,
    pub site: SiteProfile,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            human_typing: true,
            site: SiteProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    match dirs::data_dir() {
        Some(dir) => format!("sqlite://{}", dir.join("hireloop").join("hireloop.db").display()),
        None => "sqlite://hireloop.db".into(),
    }
}

/// Tunables of the orchestration core. Times are milliseconds unless the
/// field name says otherwise.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub ready_attempts: u32,
    pub ready_interval_ms: u64,
    pub detail_attempts: u32,
    pub min_description_chars: usize,
    pub detail_retry_delay_ms: u64,
    pub prescreen_batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub max_plan_steps: usize,
    pub max_idle_iterations: u32,
    pub error_cooldown_secs: u64,
    pub surface_retry_attempts: u32,
    pub surface_retry_base_ms: u64,
    pub surface_retry_max_ms: u64,
    pub navigate_settle_ms: u64,
    pub search_settle_ms: u64,
    pub next_page_settle_ms: u64,
    pub scroll_settle_ms: u64,
    pub go_back_settle_ms: u64,
    pub open_listing_settle_ms: u64,
    pub apply_settle_ms: u64,
    pub wait_default_ms: u64,
    pub stale_tab_max_age_secs: u64,
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ready_attempts: 15,
            ready_interval_ms: 1_000,
            detail_attempts: 6,
            min_description_chars: 200,
            detail_retry_delay_ms: 1_500,
            prescreen_batch_size: 3,
            inter_batch_delay_ms: 2_000,
            max_plan_steps: 100,
            max_idle_iterations: 3,
            error_cooldown_secs: 30,
            surface_retry_attempts: 3,
            surface_retry_base_ms: 500,
            surface_retry_max_ms: 5_000,
            navigate_settle_ms: 3_000,
            search_settle_ms: 3_000,
            next_page_settle_ms: 3_000,
            scroll_settle_ms: 2_000,
            go_back_settle_ms: 2_000,
            open_listing_settle_ms: 2_000,
            apply_settle_ms: 2_000,
            wait_default_ms: 2_000,
            stale_tab_max_age_secs: 1_800,
            event_buffer: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn stale_tab_max_age(&self) -> Duration {
        Duration::from_secs(self.stale_tab_max_age_secs)
    }
}

/// Per-run knobs accepted by `start`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    pub confidence_threshold: f64,
    pub apply_delay_seconds: u64,
    /// Pause between loop iterations.
    pub search_delay_seconds: u64,
    pub max_applications: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            apply_delay_seconds: 5,
            search_delay_seconds: 10,
            max_applications: 10,
        }
    }
}

impl RunSettings {
    /// Clamp the threshold into `[0, 1]`; NaN becomes the default.
    pub fn normalized(mut self) -> Self {
        self.confidence_threshold = if self.confidence_threshold.is_nan() {
            RunSettings::default().confidence_threshold
        } else {
            self.confidence_threshold.clamp(0.0, 1.0)
        };
        self
    }
}

/// Whether the apply step finalizes a submission or only rehearses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    Live,
    #[default]
    DryRun,
}

impl SubmissionMode {
    pub fn is_live(self) -> bool {
        matches!(self, SubmissionMode::Live)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub dir: Option<PathBuf>,
    pub filter: String,
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            dir: None,
            filter: "info".into(),
            stderr: false,
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct HireloopConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    files: Vec<File<config::FileSourceFile, config::FileFormat>>,
    inline: Vec<String>,
}

impl Default for HireloopConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HireloopConfigLoader {
    /// Start empty: every section takes its defaults unless a file, inline
    /// YAML or `HIRELOOP__` variable says otherwise.
    ///
    /// ```
    /// use hireloop_config::{HireloopConfigLoader, SubmissionMode};
    ///
    /// let config = HireloopConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.orchestrator.prescreen_batch_size, 3);
    /// assert_eq!(config.submission_mode, SubmissionMode::DryRun);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            files: Vec::new(),
            inline: Vec::new(),
        }
    }

    /// `$XDG_CONFIG_HOME/hireloop/hireloop.yaml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hireloop").join("hireloop.yaml"))
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use hireloop_config::{HireloopConfigLoader, LlmConfig};
    ///
    /// let cfg = HireloopConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// llm:
    ///   provider: ollama
    ///   model: llama3.1
    ///   qps: 0.5
    /// orchestrator:
    ///   max_idle_iterations: 5
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(matches!(cfg.llm.provider, LlmConfig::Ollama { .. }));
    /// assert_eq!(cfg.llm.qps, 0.5);
    /// assert_eq!(cfg.orchestrator.max_idle_iterations, 5);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.inline.push(yaml.to_owned());
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use hireloop_config::{HireloopConfigLoader, LlmConfig};
    ///
    /// unsafe { std::env::set_var("HIRELOOP_DOC_TOKEN", "injected-from-env"); }
    ///
    /// let config = HireloopConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: openai
    ///   model: gpt-4o
    ///   auth_token: "${HIRELOOP_DOC_TOKEN}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match &config.llm.provider {
    ///     LlmConfig::Openai { model, auth_token, endpoint, .. } => {
    ///         assert_eq!(model, "gpt-4o");
    ///         assert_eq!(auth_token.as_deref(), Some("injected-from-env"));
    ///         assert_eq!(endpoint, "https://api.openai.com/v1");
    ///     }
    ///     _ => panic!("expected OpenAI configuration"),
    /// }
    ///
    /// unsafe { std::env::remove_var("HIRELOOP_DOC_TOKEN"); }
    /// ```
    pub fn load(self) -> Result<HireloopConfig, ConfigError> {
        let mut builder = self.builder;
        for file in self.files {
            builder = builder.add_source(file);
        }
        for yaml in &self.inline {
            builder = builder.add_source(File::from_str(yaml, config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let cfg = builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: HireloopConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
