//! The `process_code` result contract.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Kind of artifact a run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotType {
    #[default]
    None,
    /// A serialized interactive chart spec (`plotly` on the wire).
    Interactive,
    /// A base64-encoded static image (`matplotlib` on the wire).
    Image,
}

impl PlotType {
    fn from_wire(tag: Option<&str>) -> Self {
        match tag {
            Some("plotly") => Self::Interactive,
            Some("matplotlib") => Self::Image,
            Some("none") | None => Self::None,
            Some(other) => {
                tracing::debug!(plot_type = other, "Unrecognized plot type");
                Self::None
            }
        }
    }

    fn to_wire(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Interactive => "plotly",
            Self::Image => "matplotlib",
        }
    }
}

/// Outcome of running one snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub plot_type: PlotType,
    /// Chart spec, base64 image, or nothing.
    pub payload: Option<String>,
    /// Captured stdout, followed by the traceback on error.
    pub console_output: String,
}

#[derive(Serialize, Deserialize)]
struct ResultWire {
    status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plot_type: Option<String>,
    #[serde(default)]
    plot_data: Option<String>,
    #[serde(default)]
    output: String,
}

impl ExecutionResult {
    pub fn success(plot_type: PlotType, payload: Option<String>, output: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            plot_type,
            payload,
            console_output: output.into(),
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            plot_type: PlotType::None,
            payload: None,
            console_output: output.into(),
        }
    }

    /// Parse the JSON string returned by `process_code`.
    pub fn parse(json: &str) -> Result<Self> {
        let wire: ResultWire = serde_json::from_str(json)?;
        Ok(Self {
            status: wire.status,
            plot_type: PlotType::from_wire(wire.plot_type.as_deref()),
            payload: wire.plot_data,
            console_output: wire.output,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let wire = ResultWire {
            status: self.status,
            plot_type: Some(self.plot_type.to_wire().to_string()),
            plot_data: self.payload.clone(),
            output: self.console_output.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
