//! Page controller.
//!
//! A [`Page`] owns one lazily provisioned interpreter [`SessionCell`] and a
//! [`ComponentTree`]. Each [`SimulationBlock`] pairs an editor, a run button,
//! and an output pane inside a container node of that tree.

pub mod guard;
pub mod host;
pub mod interpreter;
pub mod manifest;
pub mod previews;
pub mod python;
pub mod session;
pub mod simulation;
pub mod tree;

#[cfg(test)]
pub(crate) mod fake;

pub use host::{ConsoleHost, PageHost};
pub use interpreter::{Interpreter, Launcher};
pub use session::{EngineSource, Session, SessionCell, SessionSettings};
pub use simulation::{Page, RunOutcome, SimulationBlock, SimulationSpec};
pub use tree::{ComponentTree, ElementKind, NodeId};
