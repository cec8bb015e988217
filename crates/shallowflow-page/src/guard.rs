//! Timeout and cancellation around suspending calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shallowflow_core::{Result, ShallowFlowError};

/// Run `fut` unless `limit` elapses or `cancel` fires first.
///
/// An already cancelled token wins over a future that is ready immediately.
pub async fn guarded<T, F>(
    operation: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShallowFlowError::Cancelled(operation.to_string())),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(ShallowFlowError::timeout(operation, limit)),
        },
    }
}
