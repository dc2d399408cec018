//! Resource pipelines and their orchestration.
//!
//! Each requested resource type runs as one [`ResourcePipeline`]: open a
//! transaction, recreate the table, stream extracted items through
//! enrichment and projection into the loader, commit. The [`Orchestrator`]
//! schedules the pipelines on the shared `PipelineRunner` so at most
//! `total_concurrency` of them stream at once.

mod orchestrator;
mod resource;

pub use orchestrator::{Orchestrator, RunReport};
pub use resource::{PipelineContext, PipelineState, ResourcePipeline};
