//! Chained pipeline: transcribe → translate → synthesize.
//!
//! Used when the realtime path is not available. One invocation handles one
//! audio buffer; stages run strictly in order and the first failure aborts
//! the run. Partial results captured before the failure travel with the
//! error for logging.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use lenguas_core::config::{Config, DEFAULT_MAX_AUDIO_BYTES, DEFAULT_MAX_TEXT_CHARS};
use lenguas_core::error::{Result, TranslatorError};
use lenguas_core::languages;
use lenguas_providers::{UpstreamProvider, VoiceParams};

use crate::tts_stream::collect_audio;

/// Language of the speech handed to the pipeline.
pub const SOURCE_LANGUAGE: &str = "es";

/// Size and time caps applied to one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLimits {
    /// Longest text handed to speech synthesis, in characters.
    pub max_text_chars: usize,
    /// Largest synthesized audio accepted, in bytes.
    pub max_audio_bytes: usize,
    /// Bound on each upstream stage.
    pub stage_timeout: Duration,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            stage_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_text_chars: config.max_text_chars(),
            max_audio_bytes: config.max_audio_bytes(),
            stage_timeout: config.upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Transcribe,
    Translate,
    Synthesize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub transcript: String,
    pub translation: String,
    pub audio: Bytes,
    pub language: String,
    /// Whether the translation was cut to `max_text_chars` before synthesis.
    pub truncated: bool,
}

/// A failed run: the stage that failed, the error, and whatever succeeded
/// before it.
#[derive(Debug)]
pub struct PipelineError {
    pub stage: Stage,
    pub transcript: Option<String>,
    pub translation: Option<String>,
    pub source: TranslatorError,
}

impl PipelineError {
    fn at(stage: Stage, source: TranslatorError) -> Self {
        Self {
            stage,
            transcript: None,
            translation: None,
            source,
        }
    }

    pub fn into_inner(self) -> TranslatorError {
        self.source
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub struct ChainedPipeline {
    upstream: Arc<dyn UpstreamProvider>,
    limits: PipelineLimits,
    voice: VoiceParams,
}

impl ChainedPipeline {
    pub fn new(upstream: Arc<dyn UpstreamProvider>, limits: PipelineLimits, voice: VoiceParams) -> Self {
        Self {
            upstream,
            limits,
            voice,
        }
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    /// Run the full chain for one buffer of Spanish speech.
    pub async fn run(
        &self,
        audio: Bytes,
        language: &str,
        include_domain_context: bool,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let instructions = languages::build_instructions(language, include_domain_context)
            .map_err(|e| PipelineError::at(Stage::Validate, e))?;

        info!(
            language,
            input_kb = %format!("{:.2}", kib(audio.len())),
            "Chained pipeline started"
        );

        let transcript = self
            .stage(Stage::Transcribe, self.upstream.transcribe(audio, SOURCE_LANGUAGE))
            .await
            .map_err(|e| PipelineError::at(Stage::Transcribe, e))?;
        debug!(chars = transcript.chars().count(), "Transcribed");

        let translation = match self
            .stage(Stage::Translate, self.upstream.translate(&instructions, &transcript))
            .await
        {
            Ok(t) => t,
            Err(source) => {
                return Err(PipelineError {
                    transcript: Some(transcript),
                    ..PipelineError::at(Stage::Translate, source)
                });
            }
        };

        let (speech_text, truncated) = truncate_chars(&translation, self.limits.max_text_chars);
        if truncated {
            info!(
                chars = translation.chars().count(),
                used = self.limits.max_text_chars,
                "Translation truncated for synthesis"
            );
        }

        let audio = match self.synthesize(speech_text).await {
            Ok(audio) => audio,
            Err(source) => {
                return Err(PipelineError {
                    transcript: Some(transcript),
                    translation: Some(translation),
                    ..PipelineError::at(Stage::Synthesize, source)
                });
            }
        };

        info!(
            language,
            output_kb = %format!("{:.2}", kib(audio.len())),
            output_mb = %format!("{:.2}", kib(audio.len()) / 1024.0),
            truncated,
            "Chained pipeline complete"
        );

        Ok(PipelineResult {
            transcript,
            translation,
            audio,
            language: language.to_string(),
            truncated,
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let started = tokio::time::Instant::now();
        let stream = self
            .stage(Stage::Synthesize, self.upstream.synthesize(text, &self.voice))
            .await?;
        let remaining = self.limits.stage_timeout.saturating_sub(started.elapsed());
        collect_audio(stream, self.limits.max_audio_bytes, remaining).await
    }

    async fn stage<T>(
        &self,
        stage: Stage,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.limits.stage_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(stage = %stage, kind = e.kind(), error = %e, "Pipeline stage failed");
                Err(e)
            }
            Err(_) => {
                warn!(stage = %stage, "Pipeline stage timed out");
                Err(TranslatorError::UpstreamUnavailable(format!(
                    "{stage} timed out after {}s",
                    self.limits.stage_timeout.as_secs()
                )))
            }
        }
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn kib(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}
