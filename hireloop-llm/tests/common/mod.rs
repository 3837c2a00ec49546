use std::sync::OnceLock;

use hireloop_common::observability::{init_logging, LogConfig};
use hireloop_common::LogFormat;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "hireloop-llm-tests",
            emit_stderr: true,
            format: if std::env::var("HIRELOOP_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".into(),
            ..LogConfig::default()
        };

        init_logging(config).unwrap_or_default()
    });
}
