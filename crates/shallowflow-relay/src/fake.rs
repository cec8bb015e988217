//! In-memory runtime and fetcher for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use shallowflow_core::fetch::Fetcher;
use shallowflow_core::protocol::{DocumentState, PatchOrigin};
use shallowflow_core::{Result, ShallowFlowError};

use crate::runtime::{PatchSink, Runtime};

#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub sink: Arc<Mutex<Option<PatchSink>>>,
    pub location: Arc<Mutex<Map<String, Value>>>,
    pub location_schema: Option<Vec<String>>,
    pub fail_install: bool,
    pub fail_patch: bool,
    pub bootstrap_trace: Option<String>,
    pub bootstrap_source: Arc<Mutex<Option<String>>>,
    pub load_delay: Duration,
    pub patch_delay: Duration,
}

impl FakeRuntime {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn load(&mut self) -> Result<()> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.record("load");
        Ok(())
    }

    fn expose_patch_sink(&mut self, sink: PatchSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn unpack_archive(&mut self, name: &str, _data: Vec<u8>) -> Result<()> {
        self.record(&format!("unpack:{name}"));
        Ok(())
    }

    async fn install(&mut self, _packages: &[String]) -> Result<()> {
        self.record("install");
        if self.fail_install {
            return Err(ShallowFlowError::Install("no such wheel".into()));
        }
        Ok(())
    }

    async fn run_bootstrap(&mut self, script: &str) -> Result<DocumentState> {
        self.record("bootstrap");
        *self.bootstrap_source.lock().unwrap() = Some(script.to_string());
        if let Some(trace) = &self.bootstrap_trace {
            return Err(ShallowFlowError::script(trace.clone()));
        }
        Ok(DocumentState {
            docs_json: json!({"doc-1": {"roots": []}}),
            render_items: json!([{"docid": "doc-1"}]),
            root_ids: json!(["root-1"]),
        })
    }

    async fn link_document(&mut self) -> Result<()> {
        self.record("link");
        Ok(())
    }

    async fn apply_patch(
        &mut self,
        _patch: Value,
        _buffers: Vec<Value>,
        origin: PatchOrigin,
    ) -> Result<()> {
        self.record("enter");
        if !self.patch_delay.is_zero() {
            tokio::time::sleep(self.patch_delay).await;
        }
        self.record("exit");
        if self.fail_patch {
            return Err(ShallowFlowError::Runtime("patch rejected".into()));
        }
        let origin = match origin {
            PatchOrigin::Host => "host",
            PatchOrigin::Interpreter => "interpreter",
        };
        self.record(&format!("patch:{origin}"));
        Ok(())
    }

    fn location_schema(&self) -> Option<Vec<String>> {
        self.location_schema.clone()
    }

    async fn update_location(&mut self, fields: Map<String, Value>) -> Result<()> {
        self.record("location");
        self.location.lock().unwrap().extend(fields);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub files: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| ShallowFlowError::fetch(location, "not found"))
    }
}
