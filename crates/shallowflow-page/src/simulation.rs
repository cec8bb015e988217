//! Simulation blocks: editor, run button, and output pane per page section.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shallowflow_core::config::{Config, PageConfig};
use shallowflow_core::execution::PlotType;
use shallowflow_core::fetch::Fetcher;
use shallowflow_core::{Result, ShallowFlowError};

use crate::guard::guarded;
use crate::host::PageHost;
use crate::session::SessionCell;
use crate::tree::{ComponentTree, ElementKind, NodeId, Style};

pub const SCRIPT_ERROR_ALERT: &str = "Python Error: See browser console for traceback.";

pub type SharedTree = Arc<Mutex<ComponentTree>>;

/// Inputs for one simulation block.
#[derive(Debug, Clone)]
pub struct SimulationSpec {
    pub target: NodeId,
    pub code_url: String,
    pub static_img_url: String,
}

/// What a single activation of the run button did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run on this block was still computing.
    Busy,
    RenderedInteractive,
    RenderedImage,
    /// The code ran but produced no artifact.
    NoArtifact,
    /// The code raised; the traceback went to the log.
    ScriptError,
    /// The session or the interpreter call itself failed.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Idle,
    Computing,
    RenderedInteractive,
    RenderedImage,
}

#[derive(Debug, Clone, Copy)]
struct BlockHandles {
    preview: NodeId,
    pane: NodeId,
    editor: NodeId,
    button: NodeId,
}

#[derive(Debug, Default, Deserialize)]
struct ChartSpec {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    layout: Value,
}

/// Composes the component tree, the interpreter session, and the collaborators
/// shared by every block on the page.
pub struct Page {
    tree: SharedTree,
    session: Arc<SessionCell>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn PageHost>,
    settings: PageConfig,
    fetch_timeout: Duration,
}

impl Page {
    pub fn new(
        session: Arc<SessionCell>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn PageHost>,
        config: &Config,
    ) -> Self {
        Self {
            tree: Arc::new(Mutex::new(ComponentTree::new())),
            session,
            fetcher,
            host,
            settings: config.page(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn tree(&self) -> SharedTree {
        self.tree.clone()
    }

    pub fn session(&self) -> Arc<SessionCell> {
        self.session.clone()
    }

    /// Add an empty section container to host a block.
    pub async fn add_section(&self) -> NodeId {
        self.tree.lock().await.add_root(ElementKind::Container)
    }

    /// Build a block inside `spec.target`, replacing whatever it held.
    ///
    /// Returns `None` (after logging) when the target does not exist. A
    /// failed snippet fetch is replaced with the placeholder text.
    pub async fn create_simulation(&self, spec: SimulationSpec) -> Option<SimulationBlock> {
        let handles = {
            let mut tree = self.tree.lock().await;
            if !tree.contains(spec.target) {
                error!(target_id = ?spec.target, "Simulation target not found");
                return None;
            }
            self.build_structure(&mut tree, &spec)?
        };

        let code = match guarded(
            "fetch snippet",
            self.fetch_timeout,
            self.session.cancellation(),
            self.fetcher.fetch_text(&spec.code_url),
        )
        .await
        {
            Ok(code) => code,
            Err(e) => {
                error!(url = %spec.code_url, error = %e, "Could not fetch snippet");
                self.settings.placeholder_code.clone()
            }
        };

        self.tree
            .lock()
            .await
            .set_editor_text(handles.editor, code);
        debug!(target_id = ?spec.target, url = %spec.code_url, "Simulation block ready");

        Some(SimulationBlock {
            spec,
            handles,
            tree: self.tree.clone(),
            session: self.session.clone(),
            host: self.host.clone(),
            settings: self.settings.clone(),
            state: Arc::new(StdMutex::new(BlockState::Idle)),
        })
    }

    fn build_structure(&self, tree: &mut ComponentTree, spec: &SimulationSpec) -> Option<BlockHandles> {
        tree.clear_children(spec.target);

        let plot = tree.append(spec.target, ElementKind::Container)?;
        let preview = tree.append(
            plot,
            ElementKind::Image {
                src: spec.static_img_url.clone(),
            },
        )?;
        let pane = tree.append_styled(plot, ElementKind::Pane, Style::hidden())?;

        let controls = tree.append(spec.target, ElementKind::Container)?;
        tree.append(
            controls,
            ElementKind::Label {
                text: format!("Source: {}", spec.code_url),
            },
        )?;
        let button = tree.append(
            controls,
            ElementKind::Button {
                label: self.settings.run_label.clone(),
                enabled: true,
            },
        )?;

        let editor = tree.append(
            spec.target,
            ElementKind::Editor {
                text: String::new(),
            },
        )?;

        Some(BlockHandles {
            preview,
            pane,
            editor,
            button,
        })
    }
}

/// One page section. [`SimulationBlock::run`] is the run button's handler.
pub struct SimulationBlock {
    spec: SimulationSpec,
    handles: BlockHandles,
    tree: SharedTree,
    session: Arc<SessionCell>,
    host: Arc<dyn PageHost>,
    settings: PageConfig,
    state: Arc<StdMutex<BlockState>>,
}

impl SimulationBlock {
    pub fn spec(&self) -> &SimulationSpec {
        &self.spec
    }

    pub fn pane(&self) -> NodeId {
        self.handles.pane
    }

    pub fn preview(&self) -> NodeId {
        self.handles.preview
    }

    pub fn editor(&self) -> NodeId {
        self.handles.editor
    }

    pub fn button(&self) -> NodeId {
        self.handles.button
    }

    pub fn state(&self) -> BlockState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the editor contents.
    pub async fn set_code(&self, code: &str) {
        self.tree
            .lock()
            .await
            .set_editor_text(self.handles.editor, code);
    }

    /// Run the editor contents and render the artifact.
    ///
    /// The button is disabled while computing and always restored afterwards,
    /// also when the returned future is dropped before it completes. A block
    /// that is already computing rejects the activation.
    pub async fn run(&self) -> RunOutcome {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == BlockState::Computing {
                debug!(target_id = ?self.spec.target, "Run ignored, block is computing");
                return RunOutcome::Busy;
            }
            *state = BlockState::Computing;
        }

        let mut guard = RunGuard {
            tree: self.tree.clone(),
            state: self.state.clone(),
            button: self.handles.button,
            label: self.settings.run_label.clone(),
            next: BlockState::Idle,
            restored: false,
        };
        {
            let mut tree = self.tree.lock().await;
            if let Some((label, _)) = tree.button(self.handles.button) {
                guard.label = label.to_string();
            }
            tree.set_button(self.handles.button, &self.settings.computing_label, false);
        }

        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(target_id = ?self.spec.target, error = %e, "Runtime error");
                self.host.alert(&format!("Runtime Error: {e}"));
                RunOutcome::Failed(e.to_string())
            }
        };

        let next = match outcome {
            RunOutcome::RenderedInteractive => BlockState::RenderedInteractive,
            RunOutcome::RenderedImage => BlockState::RenderedImage,
            _ => BlockState::Idle,
        };
        guard.finish(next).await;
        outcome
    }

    async fn execute(&self) -> Result<RunOutcome> {
        let session = self.session.get_session().await?;
        let code = self
            .tree
            .lock()
            .await
            .editor_text(self.handles.editor)
            .unwrap_or_default()
            .to_string();

        let result = session.process_code(&code).await?;

        if !result.is_success() {
            error!(target_id = ?self.spec.target, "Python Traceback:\n{}", result.console_output);
            self.host.alert(SCRIPT_ERROR_ALERT);
            return Ok(RunOutcome::ScriptError);
        }
        if !result.console_output.is_empty() {
            info!(target_id = ?self.spec.target, output = %result.console_output, "Run output");
        }

        match result.plot_type {
            PlotType::Interactive => {
                let payload = result.payload.ok_or_else(|| missing_payload("plotly"))?;
                let chart: ChartSpec = serde_json::from_str(&payload)?;
                self.show_chart(chart).await;
                Ok(RunOutcome::RenderedInteractive)
            }
            PlotType::Image => {
                let payload = result.payload.ok_or_else(|| missing_payload("matplotlib"))?;
                base64::engine::general_purpose::STANDARD
                    .decode(payload.as_bytes())
                    .map_err(|e| ShallowFlowError::Protocol(format!("invalid image payload: {e}")))?;
                self.show_image(&payload).await;
                Ok(RunOutcome::RenderedImage)
            }
            PlotType::None => {
                warn!(target_id = ?self.spec.target, "Run produced no figure");
                Ok(RunOutcome::NoArtifact)
            }
        }
    }

    /// Render the chart, then cross-fade from the static preview to it.
    async fn show_chart(&self, chart: ChartSpec) {
        {
            let mut tree = self.tree.lock().await;
            tree.replace_children(
                self.handles.pane,
                ElementKind::Chart {
                    data: chart.data,
                    layout: chart.layout,
                },
            );
            if let Some(style) = tree.style_mut(self.handles.preview) {
                style.opacity = 0.0;
            }
        }

        tokio::time::sleep(Duration::from_millis(self.settings.crossfade_ms)).await;

        let mut tree = self.tree.lock().await;
        if let Some(style) = tree.style_mut(self.handles.preview) {
            style.displayed = false;
        }
        reveal(&mut tree, self.handles.pane);
    }

    async fn show_image(&self, base64_png: &str) {
        let mut tree = self.tree.lock().await;
        if let Some(style) = tree.style_mut(self.handles.preview) {
            style.displayed = false;
        }
        reveal(&mut tree, self.handles.pane);
        tree.replace_children(
            self.handles.pane,
            ElementKind::Image {
                src: format!("data:image/png;base64,{base64_png}"),
            },
        );
    }
}

/// Re-enables the run button and leaves `Computing` once a run ends.
///
/// Dropping an unfinished guard restores the button with `try_lock`, or from
/// a spawned task when the tree is held elsewhere.
struct RunGuard {
    tree: SharedTree,
    state: Arc<StdMutex<BlockState>>,
    button: NodeId,
    label: String,
    next: BlockState,
    restored: bool,
}

impl RunGuard {
    async fn finish(mut self, next: BlockState) {
        self.tree
            .lock()
            .await
            .set_button(self.button, self.label.as_str(), true);
        self.restored = true;
        self.next = next;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.restored {
            set_state(&self.state, self.next);
            return;
        }

        debug!("Run abandoned before completion, restoring button");
        if let Ok(mut tree) = self.tree.try_lock() {
            tree.set_button(self.button, self.label.as_str(), true);
            set_state(&self.state, self.next);
            return;
        }

        let tree = self.tree.clone();
        let state = self.state.clone();
        let button = self.button;
        let label = std::mem::take(&mut self.label);
        let next = self.next;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tree.lock().await.set_button(button, label, true);
                    set_state(&state, next);
                });
            }
            Err(_) => set_state(&state, next),
        }
    }
}

fn set_state(state: &StdMutex<BlockState>, next: BlockState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

fn reveal(tree: &mut ComponentTree, pane: NodeId) {
    if let Some(style) = tree.style_mut(pane) {
        style.visible = true;
        style.opacity = 1.0;
    }
}

fn missing_payload(kind: &str) -> ShallowFlowError {
    ShallowFlowError::Protocol(format!("{kind} result has no plot_data"))
}
