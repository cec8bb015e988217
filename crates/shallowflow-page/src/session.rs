//! Lazily provisioned interpreter session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shallowflow_core::Result;
use shallowflow_core::config::Config;
use shallowflow_core::execution::ExecutionResult;
use shallowflow_core::fetch::Fetcher;

use crate::guard::guarded;
use crate::host::PageHost;
use crate::interpreter::{Interpreter, Launcher};

pub const LOADING_TEXT: &str = "\u{1f300} Initializing Python Engine...";

/// The engine script that ships with the crate. Defines `process_code`.
pub const BUNDLED_ENGINE: &str = include_str!("../assets/engine.py");

pub(crate) const RESET_SCOPE: &str = "if 'reset_scope' in globals():\n    reset_scope()\n";

/// Where the engine script comes from.
#[derive(Debug, Clone)]
pub enum EngineSource {
    Embedded(String),
    /// Fetched by URL or path; falls back to the bundled engine on failure.
    Location(String),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub packages: Vec<String>,
    pub install_packages: bool,
    pub engine: EngineSource,
    pub install_timeout: Duration,
    pub fetch_timeout: Duration,
    pub execute_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let runtime = config.runtime();
        Self {
            packages: runtime.packages,
            install_packages: runtime.install_packages,
            engine: runtime
                .engine_script
                .map(EngineSource::Location)
                .unwrap_or_else(|| EngineSource::Embedded(BUNDLED_ENGINE.to_string())),
            install_timeout: config.install_timeout(),
            fetch_timeout: config.fetch_timeout(),
            execute_timeout: config.execute_timeout(),
        }
    }
}

/// A ready interpreter with the engine loaded.
#[derive(Clone)]
pub struct Session {
    interpreter: Arc<dyn Interpreter>,
    execute_timeout: Duration,
    cancel: CancellationToken,
}

impl Session {
    /// Run `code` through `process_code` and parse the reply.
    pub async fn process_code(&self, code: &str) -> Result<ExecutionResult> {
        let raw = guarded(
            "process_code",
            self.execute_timeout,
            &self.cancel,
            self.interpreter.process_code(code),
        )
        .await?;
        ExecutionResult::parse(&raw)
    }

    /// Drop the variables and open figures left behind by earlier runs.
    ///
    /// Engines without a `reset_scope` function are left untouched.
    pub async fn reset_scope(&self) -> Result<()> {
        guarded(
            "reset_scope",
            self.execute_timeout,
            &self.cancel,
            self.interpreter.run_script(RESET_SCOPE),
        )
        .await
    }
}

/// Single-initialization guard around the page's one interpreter.
///
/// The first caller of [`SessionCell::get_session`] provisions the
/// interpreter; concurrent callers wait on that same attempt. A failed
/// attempt leaves the cell empty so a later call retries.
pub struct SessionCell {
    cell: OnceCell<Session>,
    launcher: Arc<dyn Launcher>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn PageHost>,
    settings: SessionSettings,
    cancel: CancellationToken,
}

impl SessionCell {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn PageHost>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            cell: OnceCell::new(),
            launcher,
            fetcher,
            host,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// Abort pending and future interpreter calls made through this cell.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that fires when [`SessionCell::cancel`] is called.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn get_session(&self) -> Result<Session> {
        let session = self.cell.get_or_try_init(|| self.initialize()).await?;
        Ok(session.clone())
    }

    async fn initialize(&self) -> Result<Session> {
        self.host.show_loading(LOADING_TEXT);
        info!("Starting interpreter");

        match self.provision().await {
            Ok(session) => {
                self.host.hide_loading();
                info!("Interpreter ready");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Interpreter failed to start");
                self.host
                    .show_loading(&format!("Interpreter failed to start: {e}"));
                Err(e)
            }
        }
    }

    async fn provision(&self) -> Result<Session> {
        let s = &self.settings;
        let interpreter = guarded(
            "launch",
            s.install_timeout,
            &self.cancel,
            self.launcher.launch(),
        )
        .await?;

        if s.install_packages && !s.packages.is_empty() {
            info!(packages = ?s.packages, "Installing scientific stack");
            guarded(
                "install",
                s.install_timeout,
                &self.cancel,
                interpreter.install(&s.packages),
            )
            .await?;
        }

        let engine = self.engine_source().await?;
        info!("Loading engine script");
        guarded(
            "engine script",
            s.execute_timeout,
            &self.cancel,
            interpreter.run_script(&engine),
        )
        .await?;

        Ok(Session {
            interpreter,
            execute_timeout: s.execute_timeout,
            cancel: self.cancel.clone(),
        })
    }

    async fn engine_source(&self) -> Result<String> {
        match &self.settings.engine {
            EngineSource::Embedded(text) => Ok(text.clone()),
            EngineSource::Location(url) => {
                let fetched = guarded(
                    "fetch engine",
                    self.settings.fetch_timeout,
                    &self.cancel,
                    self.fetcher.fetch_text(url),
                )
                .await;
                match fetched {
                    Ok(text) => Ok(text),
                    Err(e @ shallowflow_core::ShallowFlowError::Cancelled(_)) => Err(e),
                    Err(e) => {
                        warn!(url, error = %e, "Engine script unavailable, using bundled engine");
                        Ok(BUNDLED_ENGINE.to_string())
                    }
                }
            }
        }
    }
}
