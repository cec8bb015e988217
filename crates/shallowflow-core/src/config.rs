//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level ShallowFlow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Page-side interpreter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interpreter executable (default: "python3").
    #[serde(default = "default_python")]
    pub python: String,

    /// Packages installed before the engine script runs.
    #[serde(default = "default_page_packages")]
    pub packages: Vec<String>,

    /// Skip package installation entirely when false.
    #[serde(default = "default_true")]
    pub install_packages: bool,

    /// Engine script location (URL or path). The bundled engine is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_script: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            packages: default_page_packages(),
            install_packages: true,
            engine_script: None,
        }
    }
}

fn default_python() -> String {
    "python3".into()
}

fn default_page_packages() -> Vec<String> {
    vec!["numpy".into(), "plotly".into(), "matplotlib".into()]
}

fn default_true() -> bool {
    true
}

/// Worker relay settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Packages (names or wheel URLs) installed during relay setup.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Zip archives fetched and unpacked into the runtime before install.
    #[serde(default)]
    pub data_archives: Vec<String>,

    /// Bootstrap script location (URL or path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_script: Option<String>,
}

/// Timeouts around every suspending call, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_install_ms")]
    pub install_ms: u64,

    #[serde(default = "default_fetch_ms")]
    pub fetch_ms: u64,

    #[serde(default = "default_execute_ms")]
    pub execute_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            install_ms: default_install_ms(),
            fetch_ms: default_fetch_ms(),
            execute_ms: default_execute_ms(),
        }
    }
}

fn default_install_ms() -> u64 {
    600_000
}

fn default_fetch_ms() -> u64 {
    30_000
}

fn default_execute_ms() -> u64 {
    120_000
}

/// Simulation block presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Delay between fading out the preview and revealing the chart.
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,

    #[serde(default = "default_placeholder_code")]
    pub placeholder_code: String,

    #[serde(default = "default_run_label")]
    pub run_label: String,

    #[serde(default = "default_computing_label")]
    pub computing_label: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: default_crossfade_ms(),
            placeholder_code: default_placeholder_code(),
            run_label: default_run_label(),
            computing_label: default_computing_label(),
        }
    }
}

fn default_crossfade_ms() -> u64 {
    400
}

fn default_placeholder_code() -> String {
    "# Error: Snippet not found.".into()
}

fn default_run_label() -> String {
    "\u{25b6} Run Simulation".into()
}

fn default_computing_label() -> String {
    "\u{23f3} Computing...".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "shallowflow_relay=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::ShallowFlowError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::ShallowFlowError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn runtime(&self) -> RuntimeConfig {
        self.runtime.clone().unwrap_or_default()
    }

    pub fn relay(&self) -> RelayConfig {
        self.relay.clone().unwrap_or_default()
    }

    pub fn page(&self) -> PageConfig {
        self.page.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(
            self.timeouts
                .as_ref()
                .map(|t| t.install_ms)
                .unwrap_or_else(default_install_ms),
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(
            self.timeouts
                .as_ref()
                .map(|t| t.fetch_ms)
                .unwrap_or_else(default_fetch_ms),
        )
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_millis(
            self.timeouts
                .as_ref()
                .map(|t| t.execute_ms)
                .unwrap_or_else(default_execute_ms),
        )
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(runtime) = &self.runtime {
            if runtime.python.trim().is_empty() {
                errors.push("runtime.python cannot be empty".to_string());
            }
            if runtime.install_packages && runtime.packages.is_empty() {
                warnings.push("runtime.install_packages is set but no packages are listed".to_string());
            }
            if let Some(engine) = &runtime.engine_script {
                if !is_url(engine) && !Path::new(engine).exists() {
                    errors.push(format!("Engine script not found: {engine}"));
                }
            }
        }

        if let Some(relay) = &self.relay {
            if let Some(script) = &relay.bootstrap_script {
                if !is_url(script) && !Path::new(script).exists() {
                    errors.push(format!("Bootstrap script not found: {script}"));
                }
            }
            for archive in &relay.data_archives {
                if !archive.ends_with(".zip") {
                    warnings.push(format!("Data archive does not look like a zip: {archive}"));
                }
            }
        }

        if let Some(t) = &self.timeouts {
            for (name, ms) in [
                ("install_ms", t.install_ms),
                ("fetch_ms", t.fetch_ms),
                ("execute_ms", t.execute_ms),
            ] {
                if ms == 0 {
                    errors.push(format!("timeouts.{name} cannot be 0"));
                }
            }
        }

        if let Some(logging) = &self.logging {
            if !matches!(logging.format.as_str(), "plain" | "json") {
                errors.push(format!("Unknown logging.format: {}", logging.format));
            }
            if !matches!(logging.output.as_str(), "stderr" | "stdout") {
                errors.push(format!("Unknown logging.output: {}", logging.output));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Base directory for ShallowFlow data: `~/.shallowflow/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shallowflow")
}
