//! Interpreter backed by a long-lived `python3` child process.
//!
//! The child runs a small driver loop that reads one JSON request per line on
//! stdin and answers with one JSON reply per line on stdout. Anything the
//! user's code prints outside `process_code` is redirected to stderr so it
//! cannot corrupt the reply stream.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shallowflow_core::config::RuntimeConfig;
use shallowflow_core::{Result, ShallowFlowError};

use crate::interpreter::{Interpreter, Launcher};

const DRIVER: &str = r#"
import json, sys, traceback
_out = sys.stdout
sys.stdout = sys.stderr
_globals = {"__name__": "__main__"}
while True:
    _line = sys.stdin.readline()
    if not _line:
        break
    try:
        _req = json.loads(_line)
    except ValueError:
        continue
    _reply = {"id": _req.get("id"), "ok": True}
    try:
        if _req.get("op") == "exec":
            exec(_req["source"], _globals)
        elif _req.get("op") == "process":
            _reply["result"] = _globals["process_code"](_req["code"])
        else:
            raise ValueError("unknown op: %r" % _req.get("op"))
    except Exception:
        _reply["ok"] = False
        _reply["error"] = traceback.format_exc()
    _out.write(json.dumps(_reply) + "\n")
    _out.flush()
"#;

/// Starts [`PythonProcess`] interpreters.
#[derive(Debug, Clone)]
pub struct PythonLauncher {
    python: String,
}

impl PythonLauncher {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn from_config(runtime: &RuntimeConfig) -> Self {
        Self::new(runtime.python.clone())
    }
}

#[async_trait]
impl Launcher for PythonLauncher {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>> {
        let process = PythonProcess::spawn(&self.python)?;
        Ok(Arc::new(process))
    }
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct Channel {
    // Held so the child is killed when the channel drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    /// Set while a request line is being written. Still set on the next
    /// request when the previous caller was dropped mid-write.
    pending_write: bool,
}

pub struct PythonProcess {
    python: String,
    channel: Mutex<Channel>,
}

impl PythonProcess {
    pub fn spawn(python: &str) -> Result<Self> {
        let mut child = Command::new(python)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShallowFlowError::Runtime(format!("failed to start {python}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ShallowFlowError::Runtime("interpreter stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShallowFlowError::Runtime("interpreter stdout unavailable".into()))?;

        info!(python, pid = ?child.id(), "Interpreter process started");
        Ok(Self {
            python: python.to_string(),
            channel: Mutex::new(Channel {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 1,
                pending_write: false,
            }),
        })
    }

    /// Send one request and wait for the reply carrying its id.
    ///
    /// Replies to requests whose caller gave up are skipped. A line left
    /// half written by a dropped caller is terminated first, so the driver
    /// discards it as unreadable.
    async fn request(&self, mut body: serde_json::Value) -> Result<DriverReply> {
        let mut channel = self.channel.lock().await;
        let id = channel.next_id;
        channel.next_id += 1;
        body["id"] = json!(id);

        let mut line = serde_json::to_string(&body)?;
        line.push('\n');
        if channel.pending_write {
            warn!("Terminating interrupted request line");
            line.insert(0, '\n');
        }
        channel.pending_write = true;
        channel.stdin.write_all(line.as_bytes()).await?;
        channel.stdin.flush().await?;
        channel.pending_write = false;

        loop {
            let Some(raw) = channel.stdout.next_line().await? else {
                return Err(ShallowFlowError::Runtime("interpreter process exited".into()));
            };
            let reply: DriverReply = match serde_json::from_str(&raw) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable driver output");
                    continue;
                }
            };
            if reply.id == Some(id) {
                return Ok(reply);
            }
            warn!(expected = id, got = ?reply.id, "Discarding stale interpreter reply");
        }
    }
}

#[async_trait]
impl Interpreter for PythonProcess {
    async fn install(&self, packages: &[String]) -> Result<()> {
        info!(packages = ?packages, "pip install");
        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", "--quiet"])
            .args(packages)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("pip exited with an error");
        Err(ShallowFlowError::Install(reason.trim().to_string()))
    }

    async fn run_script(&self, source: &str) -> Result<()> {
        let reply = self
            .request(json!({ "op": "exec", "source": source }))
            .await?;
        if reply.ok {
            Ok(())
        } else {
            Err(ShallowFlowError::script(reply.error.unwrap_or_default()))
        }
    }

    async fn process_code(&self, code: &str) -> Result<String> {
        let reply = self
            .request(json!({ "op": "process", "code": code }))
            .await?;
        if !reply.ok {
            return Err(ShallowFlowError::script(reply.error.unwrap_or_default()));
        }
        reply
            .result
            .ok_or_else(|| ShallowFlowError::Protocol("process_code returned no value".into()))
    }
}
