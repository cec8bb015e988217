//! Page-level side effects: the loading indicator and blocking alerts.

use tracing::{info, warn};

/// Surfaces the controller talks to outside the component tree.
pub trait PageHost: Send + Sync {
    /// Show the loading indicator with `text`.
    fn show_loading(&self, text: &str);

    fn hide_loading(&self);

    /// A blocking, user-visible alert.
    fn alert(&self, message: &str);
}

/// Host for terminal use: the indicator goes to the log, alerts to stderr.
#[derive(Debug, Default)]
pub struct ConsoleHost;

impl PageHost for ConsoleHost {
    fn show_loading(&self, text: &str) {
        info!(indicator = text, "Loading");
    }

    fn hide_loading(&self) {
        info!("Loading finished");
    }

    fn alert(&self, message: &str) {
        warn!(alert = message, "Alert raised");
        eprintln!("{message}");
    }
}
