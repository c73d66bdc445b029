//! persona-switch transcript replay binary.
//!
//! Feeds a YAML transcript through the switching service one user turn at a
//! time and prints every turn result as JSON, followed by the cross-thread
//! analytics.
//!
//! # Arguments
//!
//! - `--transcript PATH`: YAML list of `{role, content}` messages (required)
//! - `--personas PATH`: YAML list of persona definitions (default: built-in catalog)
//! - `--persona ID`: Persona active at the start (default: "casual-companion")
//! - `--thread ID`: Thread id to replay under (default: "replay")
//!
//! # Environment Variables
//!
//! - `PERSONA_SWITCH_CONFIG`: Optional YAML service configuration
//! - `RUST_LOG`: Tracing filter (default: "info,persona_switch=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin replay -- --transcript chat.yaml
//! # with a custom catalog:
//! cargo run --bin replay -- --personas personas.yaml --transcript chat.yaml --persona technical-expert
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};

use persona_switch::interfaces::catalog::CASUAL_COMPANION;
use persona_switch::service::ServiceConfig;
use persona_switch::{
    builtin_personas, ContextAnalyzer, ContextAwareSwitchingService, InMemoryPersonaStore, Message,
    TemplatePromptInjector, TracingHook, TurnRequest,
};

struct Args {
    transcript: PathBuf,
    personas: Option<PathBuf>,
    persona: String,
    thread: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut transcript = None;
    let mut personas = None;
    let mut persona = CASUAL_COMPANION.to_string();
    let mut thread = "replay".to_string();

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let mut value = || args.next().with_context(|| format!("{} needs a value", flag));
        match flag.as_str() {
            "--transcript" => transcript = Some(PathBuf::from(value()?)),
            "--personas" => personas = Some(PathBuf::from(value()?)),
            "--persona" => persona = value()?,
            "--thread" => thread = value()?,
            other => bail!("unknown argument: {}", other),
        }
    }

    Ok(Args {
        transcript: transcript.context("--transcript is required")?,
        personas,
        persona,
        thread,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,persona_switch=debug".into()),
        )
        .init();

    let args = parse_args()?;

    let store = Arc::new(match &args.personas {
        Some(path) => InMemoryPersonaStore::from_yaml_file(path)?,
        None => InMemoryPersonaStore::with_personas(builtin_personas()),
    });
    let injector = Arc::new(TemplatePromptInjector::new(store.clone()));

    let config = match std::env::var("PERSONA_SWITCH_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
            ServiceConfig::from_yaml_str(&raw).with_context(|| format!("parsing {}", path))?
        }
        Err(_) => ServiceConfig::default(),
    };

    let service = ContextAwareSwitchingService::with_config(
        ContextAnalyzer::new(),
        store,
        injector,
        config,
    )
    .with_hook(TracingHook);

    let raw = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("reading {}", args.transcript.display()))?;
    let transcript: Vec<Message> = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing {}", args.transcript.display()))?;
    tracing::info!(
        "Replaying {} messages on thread {} starting as {}",
        transcript.len(),
        args.thread,
        args.persona
    );

    let mut active = args.persona.clone();
    let mut history = Vec::with_capacity(transcript.len());
    for message in transcript {
        let is_user = message.is_user();
        history.push(message);
        if !is_user {
            continue;
        }

        let request = TurnRequest::new(&args.thread, history.clone(), &active);
        let result = service.process_turn(request).await?;
        active = result.active_persona_id.clone();
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    println!("{}", serde_json::to_string_pretty(&service.analytics())?);
    service.cleanup(&args.thread);
    Ok(())
}
