//! pageforge: concurrent page image generation with streamed progress.
//!
//! A request names a task and its pages. The [`orchestration::Orchestrator`]
//! runs each page against an [`providers::ImageProvider`], persists the
//! result through [`storage::ImageStore`], records the outcome in the
//! [`state::TaskStore`] and streams events that [`sse`] frames for HTTP
//! clients.

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod providers;
pub mod server;
pub mod sse;
pub mod state;
pub mod storage;
pub mod util;

pub use error::{Error, Result};
