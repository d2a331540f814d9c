//! Orchestration layer for page generation.
//!
//! The [`Orchestrator`] validates requests and hands batches to a
//! [`BatchScheduler`], which runs page attempts on a bounded [`PagePool`]
//! and streams [`GenerationEvent`]s back in completion order.

mod events;
mod orchestrator;
mod pool;
mod prompt;
mod scheduler;
mod worker;

pub use events::{
    image_url, DoneEvent, ErrorEvent, EventStream, GenerationEvent, PageCompleteEvent,
    PageFailedEvent, PageStatus, Phase, ProgressEvent,
};
pub use orchestrator::{GenerateRequest, Orchestrator, OrchestratorSettings, DEFAULT_EVENT_BUFFER};
pub use pool::PagePool;
pub use prompt::{build_prompt, build_request, collect_references};
pub use scheduler::{BatchScheduler, BatchSummary};
pub use worker::{FailurePolicy, PageOutcome, PageWorker};
