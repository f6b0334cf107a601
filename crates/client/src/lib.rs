// crates/client/src/lib.rs
//! Network side of operation tracking: the HTTP/SSE collaborator client and
//! the tracker event loop that drives [`opwatch_core::OperationRegistry`].

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod sse;
pub mod tracker;

pub use api::{FrameStream, OperationApi};
pub use config::{ClientConfig, Endpoints};
pub use connection::{ConnectionManager, StreamSignal};
pub use error::{ClientError, TrackerError};
pub use http::HttpApi;
pub use tracker::{Tracker, TrackerHandle};
