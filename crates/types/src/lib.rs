// crates/types/src/lib.rs
//! Shared data model for live-operation tracking.
//!
//! These types cross every boundary in the workspace: they are decoded from
//! the server's push channel and polling endpoints, produced by the
//! reconciliation logic in `opwatch-core`, and exported to the dashboard as
//! TypeScript (behind the `codegen` feature).

pub mod event;
pub mod progress;

pub use event::*;
pub use progress::*;
