//! Media pipeline: chained transcription, translation and speech synthesis.

pub mod pipeline;
pub mod tts_stream;

pub use pipeline::{ChainedPipeline, PipelineError, PipelineLimits, PipelineResult, Stage};
