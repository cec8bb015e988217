//! The embedded interpreter as seen by the page.

use std::sync::Arc;

use async_trait::async_trait;

use shallowflow_core::Result;

/// A running interpreter instance.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Install packages by name or direct URL.
    async fn install(&self, packages: &[String]) -> Result<()>;

    /// Execute a script in interpreter globals.
    ///
    /// Failures raised by the script surface as `ShallowFlowError::Script`.
    async fn run_script(&self, source: &str) -> Result<()>;

    /// Call the engine's `process_code` entry point and return its JSON reply.
    async fn process_code(&self, code: &str) -> Result<String>;
}

/// Creates interpreter instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>>;
}
