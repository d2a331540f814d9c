//! Core domain models for page generation.
//!
//! Pages are the units of work; task state records the outcome of every
//! page attempted under one task identifier.

pub mod page;
pub mod task;

pub use page::{Page, PageKind};
pub use task::{GenerationContext, ImageDescriptor, TaskSnapshot, TaskState};
