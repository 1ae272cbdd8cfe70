use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};

use lenguas_core::config::{self, Config};
use lenguas_core::languages;
use lenguas_gateway::GatewayState;
use lenguas_media::{ChainedPipeline, PipelineLimits};
use lenguas_providers::openai::OpenAiUpstream;
use lenguas_providers::realtime::TungsteniteConnector;
use lenguas_providers::{UpstreamProvider, VoiceParams};

mod logging;

#[derive(Parser)]
#[command(
    name = "lenguas",
    about = "Spanish to Mexican indigenous language translation gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.lenguas/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket gateway
    Serve {
        /// Port to listen on (default: 3000, or $PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List supported languages
    Languages,

    /// Translate Spanish text
    Translate {
        /// Target language id (e.g. maya, nahuatl)
        #[arg(short, long, default_value = languages::DEFAULT_LANGUAGE)]
        language: String,

        /// Text to translate
        #[arg(short, long)]
        text: String,

        /// Include the government-procedure glossary
        #[arg(long)]
        domain: bool,
    },

    /// Translate a Spanish audio file into synthesized speech
    TranslateAudio {
        /// Input audio file
        #[arg(short, long)]
        input: String,

        /// Where to write the synthesized audio
        #[arg(short, long)]
        output: String,

        #[arg(short, long, default_value = languages::DEFAULT_LANGUAGE)]
        language: String,

        /// Include the government-procedure glossary
        #[arg(long)]
        domain: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(config::expand_path)
        .unwrap_or_else(Config::config_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.apply_env_overrides();

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose)?;

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Languages => print_languages(),
        Commands::Translate {
            language,
            text,
            domain,
        } => {
            let upstream = upstream(&config)?;
            let instructions = languages::build_instructions(&language, domain)?;
            let translation = upstream.translate(&instructions, &text).await?;
            println!("{translation}");
        }
        Commands::TranslateAudio {
            input,
            output,
            language,
            domain,
        } => translate_audio(&config, &input, &output, &language, domain).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => validate(&config, &config_path)?,
        },
    }

    Ok(())
}

fn upstream(config: &Config) -> anyhow::Result<OpenAiUpstream> {
    Ok(OpenAiUpstream::from_config(
        &config.upstream(),
        config.upstream_timeout(),
    )?)
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or_else(|| config.gateway_port());
    let upstream = upstream(&config)?;
    let api_key = config
        .upstream()
        .resolve_api_key()
        .context("no upstream API key")?;
    let connector = TungsteniteConnector::new(api_key);

    let state = GatewayState::new(Arc::new(config), Arc::new(upstream), Arc::new(connector));

    #[cfg(feature = "metrics")]
    let state = GatewayState {
        metrics: Some(lenguas_gateway::metrics::install_prometheus_recorder()?),
        ..state
    };

    tracing::info!("Starting Lenguas gateway on port {port}");
    lenguas_gateway::start_gateway(Arc::new(state), port).await
}

fn print_languages() {
    for lang in languages::list() {
        println!(
            "{} {:<10} {:<18} {:<22} {} hablantes",
            lang.flag, lang.id, lang.name, lang.name_native, lang.speakers
        );
    }
}

async fn translate_audio(
    config: &Config,
    input: &str,
    output: &str,
    language: &str,
    domain: bool,
) -> anyhow::Result<()> {
    let input = config::expand_path(input);
    let output = config::expand_path(output);
    let audio = tokio::fs::read(&input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let pipeline = ChainedPipeline::new(
        Arc::new(upstream(config)?),
        PipelineLimits::from_config(config),
        VoiceParams::from_config(&config.upstream()),
    );

    let result = pipeline.run(Bytes::from(audio), language, domain).await?;

    tokio::fs::write(&output, &result.audio)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Transcript:  {}", result.transcript);
    println!("Translation: {}", result.translation);
    if result.truncated {
        println!("(speech truncated to {} characters)", config.max_text_chars());
    }
    println!("Audio:       {} ({} bytes)", output.display(), result.audio.len());
    Ok(())
}

fn validate(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("Config: {}", path.display());

    let (warnings, errors) = config.validate();
    for w in &warnings {
        println!("  warning: {w}");
    }
    for e in &errors {
        println!("  error: {e}");
    }

    if errors.is_empty() {
        println!("Config is valid ({} warnings)", warnings.len());
        Ok(())
    } else {
        anyhow::bail!("{} config errors", errors.len())
    }
}
