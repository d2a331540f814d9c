//! Integration test suite for pageforge.
//!
//! These tests drive the orchestrator end to end: provider calls, image
//! persistence, task state and the event stream, plus the HTTP boundary
//! on a loopback listener.
//!
//! # Test Categories
//!
//! - `generation`: Full batches, covers, concurrency bound
//! - `retry`: Single retries, batch retries and regeneration
//! - `persistence`: Stored files, thumbnails, archives and reconciliation
//! - `sse`: Client disconnects and frame encoding
//! - `http`: Routes and status codes
//!
//! # CI Compatibility
//!
//! Every test uses a scripted provider and makes no external API calls.

mod fixtures;

mod generation;
mod http;
