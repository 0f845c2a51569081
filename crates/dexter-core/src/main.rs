//! Run one research query and print the agent's events as JSON lines.
//!
//! With `--provider openrouter` (the default) the API key comes from the
//! `OPENROUTER_KEY` environment variable. `--provider ollama` talks to a local
//! Ollama server at `OLLAMA_BASE_URL` (default `http://127.0.0.1:11434`) and
//! picks the first installed model unless `--model` is given. Logs go
//! to stderr (`RUST_LOG` controls the level, default `info`); events go to
//! stdout, one JSON object per line. Ctrl-C cancels the run.
//!
//! # Examples
//!
//! ```sh
//! dexter --query "What was NVDA's revenue growth last quarter?"
//!
//! dexter --query "Compare AAPL and MSFT margins" \
//!   --model anthropic/claude-sonnet-4 --max-tool-calls 20 \
//!   --cache-dir .dexter/cache
//!
//! dexter --provider ollama --model llama3 --query "Summarize TSLA's 10-K risks"
//! ```

use clap::{Parser, ValueEnum};
use dexter_core::prelude::*;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run one research query and stream the agent's events as JSON lines.
///
/// The openrouter provider reads its API key from OPENROUTER_KEY.
#[derive(Parser)]
#[command(name = "dexter")]
struct Cli {
    /// The question to research.
    #[arg(long)]
    query: String,

    /// Where decisions are made.
    #[arg(long, value_enum, default_value_t = Provider::Openrouter)]
    provider: Provider,

    /// Model to use for decisions. Defaults to openai/gpt-4.1 on
    /// OpenRouter and to the first installed model on Ollama.
    #[arg(long)]
    model: Option<String>,

    /// Tool calls allowed before an answer is forced.
    #[arg(long, default_value_t = dexter_core::agent::config::DEFAULT_MAX_TOOL_CALLS)]
    max_tool_calls: u32,

    /// Wall-clock limit for the run, in seconds.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Base directory for the long-term chat history.
    #[arg(long, default_value = dexter_core::history::long_term::DEFAULT_BASE_DIR)]
    history_dir: PathBuf,

    /// Persist the request cache in this directory. In-memory when unset.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Provider {
    Openrouter,
    Ollama,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (provider, model): (Arc<dyn LlmProvider>, String) = match cli.provider {
        Provider::Openrouter => {
            let api_key = match std::env::var("OPENROUTER_KEY") {
                Ok(key) => key,
                Err(_) => {
                    eprintln!("Error: OPENROUTER_KEY environment variable is not set");
                    std::process::exit(1);
                }
            };
            let client = match OpenRouterClient::new(api_key) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: failed to create API client: {e}");
                    std::process::exit(1);
                }
            };
            let model = cli
                .model
                .unwrap_or_else(|| dexter_core::DEFAULT_MODEL.to_string());
            (Arc::new(client), model)
        }
        Provider::Ollama => {
            let client = match OllamaClient::from_env() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: failed to create API client: {e}");
                    std::process::exit(1);
                }
            };
            let model = match cli.model {
                Some(model) => model,
                None => match client.list_models().await.into_iter().next() {
                    Some(model) => model,
                    None => {
                        eprintln!(
                            "Error: no models found on the Ollama server at {}",
                            client.base_url()
                        );
                        std::process::exit(1);
                    }
                },
            };
            (Arc::new(client), model)
        }
    };

    let cache = match &cli.cache_dir {
        Some(dir) => match RequestCache::persistent(dir) {
            Ok(cache) => cache,
            Err(e) => {
                eprintln!("Error: failed to open cache at {}: {e}", dir.display());
                std::process::exit(1);
            }
        },
        None => RequestCache::in_memory(),
    };
    let tools = ToolRegistry::new()
        .with_arg_validation(true)
        .with_default_timeout(Some(DEFAULT_TOOL_TIMEOUT))
        .with_cache(Arc::new(cache));

    let history = LongTermChatHistory::new(&cli.history_dir);
    if let Err(e) = history.load() {
        tracing::warn!("Chat history unavailable: {e}");
    }

    let config = AgentConfig::new(model)
        .with_max_tool_calls(cli.max_tool_calls)
        .with_run_timeout(Duration::from_secs(cli.timeout_secs));
    let agent = Agent::new(provider, Arc::new(tools), config);

    let mut events = match agent.run(&cli.query, Some(Arc::new(history))) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let cancel = events.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping the run...");
            cancel.cancel();
        }
    });

    while let Some(event) = events.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Failed to serialize event: {e}"),
        }
    }

    match events.status() {
        RunStatus::Completed => {}
        RunStatus::Interrupted => std::process::exit(130),
        RunStatus::Failed | RunStatus::Running => std::process::exit(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_defaults_to_openrouter() {
        let cli = Cli::try_parse_from(["dexter", "--query", "q"]).unwrap();
        assert!(matches!(cli.provider, Provider::Openrouter));
        assert_eq!(cli.model, None);
    }

    #[test]
    fn ollama_provider_is_selectable() {
        let cli =
            Cli::try_parse_from(["dexter", "--provider", "ollama", "--model", "llama3", "--query", "q"])
                .unwrap();
        assert!(matches!(cli.provider, Provider::Ollama));
        assert_eq!(cli.model.as_deref(), Some("llama3"));
    }
}
