//! The embedded interpreter as seen by the relay.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::trace;

use shallowflow_core::Result;
use shallowflow_core::protocol::{DocumentState, Event, PatchOrigin};

/// Outbound patch callback handed to the runtime.
///
/// The runtime may call [`PatchSink::send`] at any time from any task; each
/// call emits one `patch` event immediately. It never touches the runtime.
#[derive(Clone)]
pub struct PatchSink {
    events: mpsc::UnboundedSender<Event>,
}

impl PatchSink {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self { events }
    }

    /// Push a document patch to the page. Returns false once the page is gone.
    pub fn send(&self, patch: Value, buffers: Vec<Value>) -> bool {
        trace!("Interpreter pushed patch");
        self.events.send(Event::Patch { patch, buffers }).is_ok()
    }
}

/// An embedded interpreter hosting the document application.
///
/// Every method takes `&mut self`: the relay owns the runtime exclusively, so
/// no two interpreter calls can overlap.
#[async_trait]
pub trait Runtime: Send {
    /// Bring up the interpreter itself.
    async fn load(&mut self) -> Result<()>;

    /// Expose the outbound patch callback in interpreter globals.
    fn expose_patch_sink(&mut self, sink: PatchSink);

    /// Unpack a fetched zip archive into the interpreter filesystem.
    async fn unpack_archive(&mut self, name: &str, data: Vec<u8>) -> Result<()>;

    /// Install packages by name or wheel URL.
    async fn install(&mut self, packages: &[String]) -> Result<()>;

    /// Run the application script and return the initial document state.
    ///
    /// Script failures must surface as `ShallowFlowError::Script` carrying
    /// the formatted traceback.
    async fn run_bootstrap(&mut self, script: &str) -> Result<DocumentState>;

    /// Link the document to the patch sink so later state changes stream out.
    async fn link_document(&mut self) -> Result<()>;

    /// Apply a JSON patch to the document.
    async fn apply_patch(
        &mut self,
        patch: Value,
        buffers: Vec<Value>,
        origin: PatchOrigin,
    ) -> Result<()>;

    /// Parameter names of the location state, or `None` when there is none.
    fn location_schema(&self) -> Option<Vec<String>>;

    /// Merge already-filtered fields into the location state.
    async fn update_location(&mut self, fields: Map<String, Value>) -> Result<()>;
}
