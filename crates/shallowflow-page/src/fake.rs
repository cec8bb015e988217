//! Test doubles for the interpreter, launcher, host, and fetcher.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shallowflow_core::execution::{ExecutionResult, PlotType};
use shallowflow_core::fetch::Fetcher;
use shallowflow_core::{Result, ShallowFlowError};

use crate::host::PageHost;
use crate::interpreter::{Interpreter, Launcher};

#[derive(Default)]
pub struct FakeInterpreter {
    pub installs: AtomicUsize,
    pub scripts: Mutex<Vec<String>>,
    pub codes: Mutex<Vec<String>>,
    /// Replies handed out in order; an empty queue yields a plain success.
    pub replies: Mutex<VecDeque<String>>,
    pub fail_install: AtomicBool,
    /// Make `process_code` itself raise.
    pub fail_call: AtomicBool,
    pub hang: AtomicBool,
    pub call_delay: Mutex<Duration>,
}

impl FakeInterpreter {
    pub fn reply(&self, result: &ExecutionResult) {
        self.replies
            .lock()
            .unwrap()
            .push_back(result.to_json().unwrap());
    }

    pub fn reply_raw(&self, json: &str) {
        self.replies.lock().unwrap().push_back(json.to_string());
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn install(&self, _packages: &[String]) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(ShallowFlowError::Install("index unreachable".into()));
        }
        Ok(())
    }

    async fn run_script(&self, source: &str) -> Result<()> {
        self.scripts.lock().unwrap().push(source.to_string());
        Ok(())
    }

    async fn process_code(&self, code: &str) -> Result<String> {
        self.codes.lock().unwrap().push(code.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_call.load(Ordering::SeqCst) {
            return Err(ShallowFlowError::Runtime("interpreter crashed".into()));
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(json) => Ok(json),
            None => ExecutionResult::success(PlotType::None, None, "").to_json(),
        }
    }
}

pub struct FakeLauncher {
    interpreter: Arc<FakeInterpreter>,
    delay: Duration,
    pub launches: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(interpreter: Arc<FakeInterpreter>, delay: Duration) -> Self {
        Self {
            interpreter,
            delay,
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let interpreter: Arc<dyn Interpreter> = self.interpreter.clone();
        Ok(interpreter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Loading(String),
    Hidden,
    Alert(String),
}

#[derive(Default)]
pub struct RecordingHost {
    pub events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    pub fn loading_shown(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, HostEvent::Loading(_)))
            .count()
    }

    pub fn last_loading(&self) -> Option<String> {
        self.events.lock().unwrap().iter().rev().find_map(|e| match e {
            HostEvent::Loading(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn hidden(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == HostEvent::Hidden)
            .count()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Alert(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PageHost for RecordingHost {
    fn show_loading(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(HostEvent::Loading(text.to_string()));
    }

    fn hide_loading(&self) {
        self.events.lock().unwrap().push(HostEvent::Hidden);
    }

    fn alert(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(HostEvent::Alert(message.to_string()));
    }
}

#[derive(Default)]
pub struct StaticFetcher {
    pub files: HashMap<String, String>,
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        self.files
            .get(location)
            .map(|text| text.clone().into_bytes())
            .ok_or_else(|| ShallowFlowError::fetch(location, "404 Not Found"))
    }
}

/// Whether a `python3` executable is on the path for the process-backed tests.
pub async fn python_available() -> bool {
    tokio::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
