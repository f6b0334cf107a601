// crates/core/src/lib.rs
pub mod buffer;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod projector;
pub mod reconcile;
pub mod registry;
pub mod signal;

pub use buffer::{EventBuffer, EventView};
pub use error::*;
pub use frame::parse_frame;
pub use lifecycle::TerminalStateDetector;
pub use projector::ElapsedProjector;
pub use reconcile::{ProgressReconciler, ProgressSources};
pub use registry::{Effect, OperationRegistry};
