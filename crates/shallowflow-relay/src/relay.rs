//! Relay lifecycle and command dispatch.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use shallowflow_core::config::RelayConfig;
use shallowflow_core::fetch::Fetcher;
use shallowflow_core::protocol::{Command, Event, PatchOrigin};
use shallowflow_core::{Result, ShallowFlowError};

use crate::location::filter_location;
use crate::runtime::{PatchSink, Runtime};

pub const STATUS_LOADING: &str = "Loading pyodide";
pub const STATUS_INSTALLING: &str = "Installing environment";
pub const STATUS_INSTALL_FAILED: &str = "Error while installing packages";
pub const STATUS_EXECUTING: &str = "Executing code";

/// Fixed inputs for [`Relay::initialize`].
#[derive(Debug, Clone, Default)]
pub struct RelaySetup {
    pub packages: Vec<String>,
    pub data_archives: Vec<String>,
    /// Source text of the application script.
    pub bootstrap_script: String,
}

impl RelaySetup {
    pub fn from_config(config: &RelayConfig, bootstrap_script: String) -> Self {
        Self {
            packages: config.packages.clone(),
            data_archives: config.data_archives.clone(),
            bootstrap_script,
        }
    }

    /// Build the setup from `config`, fetching the bootstrap script text.
    pub async fn load(config: &RelayConfig, fetcher: &dyn Fetcher) -> Result<Self> {
        let location = config
            .bootstrap_script
            .as_deref()
            .ok_or_else(|| ShallowFlowError::Config("relay.bootstrap_script is not set".into()))?;
        let script = fetcher.fetch_text(location).await?;
        info!(location, bytes = script.len(), "Bootstrap script loaded");
        Ok(Self::from_config(config, script))
    }
}

/// Owns the runtime and mediates all communication with it.
pub struct Relay<R: Runtime> {
    runtime: R,
    fetcher: Arc<dyn Fetcher>,
    setup: RelaySetup,
    events: mpsc::UnboundedSender<Event>,
}

impl<R: Runtime> Relay<R> {
    pub fn new(
        runtime: R,
        fetcher: Arc<dyn Fetcher>,
        setup: RelaySetup,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            setup,
            events,
        }
    }

    fn emit(&self, event: Event) {
        debug!(event = event.kind(), "Relay event");
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Load the runtime, install packages, and run the bootstrap script.
    ///
    /// Install failures are reported and swallowed. A bootstrap failure is
    /// reported with the exception line of its traceback and returned.
    pub async fn initialize(&mut self) -> Result<()> {
        self.emit(Event::status(STATUS_LOADING));
        self.runtime.load().await?;
        self.runtime
            .expose_patch_sink(PatchSink::new(self.events.clone()));
        info!("Runtime loaded");

        for archive in &self.setup.data_archives {
            let data = self.fetcher.fetch_bytes(archive).await?;
            self.emit(Event::status(format!("Unpacking {archive}")));
            self.runtime.unpack_archive(archive, data).await?;
        }

        self.emit(Event::status(STATUS_INSTALLING));
        if let Err(e) = self.runtime.install(&self.setup.packages).await {
            warn!(error = %e, "Package installation failed");
            self.emit(Event::status(STATUS_INSTALL_FAILED));
        }
        info!(packages = self.setup.packages.len(), "Environment loaded");

        self.emit(Event::status(STATUS_EXECUTING));
        match self.runtime.run_bootstrap(&self.setup.bootstrap_script).await {
            Ok(doc) => {
                self.emit(doc.into());
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Bootstrap script failed");
                self.emit(Event::status(e.summary_line()));
                Err(e)
            }
        }
    }

    /// Dispatch one command. Returns after all interpreter-side effects finish.
    pub async fn handle(&mut self, command: Command) -> Result<()> {
        debug!(command = command.kind(), "Handling command");
        match command {
            Command::Rendered => self.runtime.link_document().await,
            Command::Patch { patch, buffers, .. } => {
                let applied = self
                    .runtime
                    .apply_patch(patch, buffers, PatchOrigin::Host)
                    .await;
                self.emit(Event::Idle);
                applied
            }
            Command::Location { location } => {
                let Some(schema) = self.runtime.location_schema() else {
                    debug!("Runtime has no location state");
                    return Ok(());
                };
                let fields = filter_location(&location, &schema)?;
                self.runtime.update_location(fields).await
            }
        }
    }

    /// Initialize, then serve commands in arrival order until the sender closes.
    pub async fn serve(mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<()> {
        self.initialize().await?;
        info!("Relay ready");

        while let Some(command) = commands.recv().await {
            let kind = command.kind();
            if let Err(e) = self.handle(command).await {
                warn!(command = kind, error = %e, "Command failed");
            }
        }

        debug!("Command channel closed, relay stopping");
        Ok(())
    }
}

/// The page's end of a running relay.
pub struct RelayHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl RelayHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ShallowFlowError::Protocol("relay has stopped".into()))
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

/// Spawn a relay task. Commands sent before initialization finishes are queued.
///
/// The join handle resolves to `Err` when initialization failed.
pub fn spawn<R>(
    runtime: R,
    fetcher: Arc<dyn Fetcher>,
    setup: RelaySetup,
) -> (RelayHandle, JoinHandle<Result<()>>)
where
    R: Runtime + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let relay = Relay::new(runtime, fetcher, setup, event_tx);
    let task = tokio::spawn(relay.serve(command_rx));

    (
        RelayHandle {
            commands: command_tx,
            events: event_rx,
        },
        task,
    )
}
