//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::RealtimeParams;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request bodies carry base64 audio, so the limit is well above axum's default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Hard response-size ceiling of the HTTP transport (4.5 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 4_718_592;

/// Longest translation handed to speech synthesis, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 500;

/// Largest synthesized audio the pipeline will buffer (10 MiB).
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Top-level Lenguas configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// CORS origins; `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,

    /// Responses above this size are rejected before they are sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_bytes: Option<usize>,

    /// WebSocket URL advertised to clients by `POST /api/session`. When
    /// unset it is derived from the request's `Host` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ws_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            allowed_origins: default_allowed_origins(),
            max_body_bytes: None,
            max_response_bytes: None,
            public_ws_url: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".into()]
}

/// Upstream provider configuration (OpenAI-compatible API).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bound on every upstream request and on the realtime handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Speech synthesis output format (e.g. "opus", "mp3").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl UpstreamConfig {
    /// Inline `api_key`, else the variable named by `api_key_env`
    /// (`OPENAI_API_KEY` when unset).
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some(DEFAULT_API_KEY_ENV.to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_text_chars: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audio_bytes: Option<usize>,
}

/// Where and how the CLI writes tracing output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `plain` or `json`.
    #[serde(default = "plain")]
    pub format: String,

    /// Base level; `RUST_LOG` still wins when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Extra directives such as `lenguas_gateway=debug`.
    #[serde(default)]
    pub filters: Vec<String>,

    /// `stderr` or `stdout`.
    #[serde(default = "stderr")]
    pub output: String,
}

fn plain() -> String {
    "plain".into()
}

fn stderr() -> String {
    "stderr".into()
}

/// First non-empty of an inline secret and the variable named by `env_var`.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    direct
        .iter()
        .cloned()
        .chain(env_var.iter().filter_map(|name| std::env::var(name).ok()))
        .find(|secret| !secret.is_empty())
}

/// Expand `${NAME}` references; unset variables expand to nothing.
fn substitute_env_vars(raw: &str) -> String {
    let Ok(reference) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return raw.to_string();
    };
    reference
        .replace_all(raw, |m: &regex::Captures| {
            std::env::var(&m[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Read a JSON5 file after `${NAME}` expansion. No file means defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let expanded = substitute_env_vars(&std::fs::read_to_string(path)?);
        json5::from_str(&expanded).map_err(|e| crate::error::TranslatorError::Config(e.to_string()))
    }

    /// Apply `PORT` and `ALLOWED_ORIGINS` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            self.gateway.get_or_insert_with(GatewayConfig::default).port = port;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS").filter(|o| !o.trim().is_empty()) {
            self.gateway
                .get_or_insert_with(GatewayConfig::default)
                .allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.gateway
            .as_ref()
            .map(|g| g.allowed_origins.clone())
            .unwrap_or_else(default_allowed_origins)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .and_then(|g| g.max_body_bytes)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }

    pub fn max_response_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .and_then(|g| g.max_response_bytes)
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES)
    }

    pub fn public_ws_url(&self) -> Option<&str> {
        self.gateway.as_ref().and_then(|g| g.public_ws_url.as_deref())
    }

    pub fn upstream(&self) -> UpstreamConfig {
        self.upstream.clone().unwrap_or_default()
    }

    /// Timeout applied to each upstream call and to the realtime handshake.
    pub fn upstream_timeout(&self) -> Duration {
        let secs = self
            .upstream
            .as_ref()
            .and_then(|u| u.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn max_text_chars(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.max_text_chars)
            .unwrap_or(DEFAULT_MAX_TEXT_CHARS)
    }

    pub fn max_audio_bytes(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.max_audio_bytes)
            .unwrap_or(DEFAULT_MAX_AUDIO_BYTES)
    }

    /// Realtime session parameters with config overrides applied.
    pub fn realtime_params(&self) -> RealtimeParams {
        let mut params = RealtimeParams::default();
        if let Some(upstream) = &self.upstream {
            if let Some(model) = &upstream.realtime_model {
                params.model = model.clone();
            }
            if let Some(voice) = &upstream.voice {
                params.voice = voice.clone();
            }
        }
        params
    }

    /// Check the config without touching the network. Returns
    /// `(warnings, errors)`; only errors should stop startup.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let (mut warnings, mut errors) = (Vec::new(), Vec::new());

        if self.upstream().resolve_api_key().is_none() {
            warnings.push(
                "Upstream API key is not configured (set upstream.api_key or OPENAI_API_KEY)"
                    .to_string(),
            );
        }

        if let Some(gateway) = &self.gateway {
            if gateway.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if gateway.allowed_origins.is_empty() {
                warnings.push("No allowed origins configured; browsers will be refused".to_string());
            }
        }

        if self.max_text_chars() == 0 {
            errors.push("pipeline.max_text_chars must be greater than 0".to_string());
        }
        if self.max_audio_bytes() == 0 {
            errors.push("pipeline.max_audio_bytes must be greater than 0".to_string());
        }

        if let Some(format) = self.logging.as_ref().map(|l| l.format.as_str()) {
            if format != "plain" && format != "json" {
                warnings.push(format!("Unknown log format '{format}', using plain"));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Lenguas data: `~/.lenguas/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lenguas")
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_set_variables() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_LENGUAS_KEY", "sk-test-123") };
        assert_eq!(
            substitute_env_vars(r#"{api_key: "${TEST_LENGUAS_KEY}", voice: "alloy"}"#),
            r#"{api_key: "sk-test-123", voice: "alloy"}"#
        );
        unsafe { std::env::remove_var("TEST_LENGUAS_KEY") };
    }

    #[test]
    fn test_unset_variable_expands_to_empty() {
        assert_eq!(
            substitute_env_vars(r#"{api_key: "${LENGUAS_TEST_NEVER_SET}"}"#),
            r#"{api_key: ""}"#
        );
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.gateway_port(), 3000);
        assert_eq!(config.allowed_origins(), vec!["*".to_string()]);
        assert_eq!(config.max_text_chars(), 500);
        assert_eq!(config.max_audio_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.max_response_bytes(), 4_718_592);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080, allowed_origins: ["https://example.org"] },
                upstream: { timeout_secs: 5, voice: "nova" },
                pipeline: { max_text_chars: 200 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway_port(), 8080);
        assert_eq!(config.allowed_origins(), vec!["https://example.org".to_string()]);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_text_chars(), 200);
        assert_eq!(config.realtime_params().voice, "nova");
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/etc/lenguas.json"), PathBuf::from("/etc/lenguas.json"));
        assert!(!expand_path("~/config.json").to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/lenguas/config.json")).unwrap();
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ gateway: ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::TranslatorError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "PORT" => Some("4100".into()),
            "ALLOWED_ORIGINS" => Some("https://a.example, https://b.example,".into()),
            _ => None,
        });
        assert_eq!(config.gateway_port(), 4100);
        assert_eq!(
            config.allowed_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_overrides_ignore_garbage_port() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.gateway_port(), 3000);
    }

    #[test]
    fn test_upstream_resolve_api_key() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_LENGUAS_API_KEY", "from-env") };
        let upstream = UpstreamConfig {
            api_key_env: Some("TEST_LENGUAS_API_KEY".into()),
            ..Default::default()
        };
        assert_eq!(upstream.resolve_api_key(), Some("from-env".into()));

        let direct = UpstreamConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_LENGUAS_API_KEY".into()),
            ..Default::default()
        };
        assert_eq!(direct.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_LENGUAS_API_KEY") };
    }

    #[test]
    fn test_logging_config_defaults() {
        let config: Config = json5::from_str("{ logging: {} }").unwrap();
        let Some(LoggingConfig { format, level, filters, output }) = config.logging else {
            panic!("empty logging block should still parse");
        };
        assert_eq!((format.as_str(), output.as_str()), ("plain", "stderr"));
        assert!(level.is_none() && filters.is_empty());
    }

    #[test]
    fn test_validate_zero_port_errors() {
        let config = Config {
            gateway: Some(GatewayConfig {
                port: 0,
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        let (_, errors) = config.validate();
        assert_eq!(errors, vec!["Gateway port cannot be 0".to_string()]);
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config {
            upstream: Some(UpstreamConfig {
                api_key_env: Some("LENGUAS_TEST_UNSET_KEY".into()),
                ..Default::default()
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(errors.is_empty());
        assert!(warnings[0].starts_with("Upstream API key is not configured"), "{warnings:?}");
    }
}
