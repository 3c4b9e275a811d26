//! Processing pipeline
//!
//! A durable job per stopped session, executing stages strictly in order:
//! merge → transcribe → analyze → persist → notify. Each stage's artifact
//! is written to the store before the next stage starts, each stage retries
//! independently with exponential backoff, and a stage exhausting its
//! retries marks the session failed with the stage recorded.

mod job;
mod worker;

pub use job::{PipelineCheckpoint, PipelineJob, Stage};
pub use worker::PipelineWorker;
