//! lmstudio: prompt and inspect a local LM Studio server
//!
//! Thin front end over lmstudio-core.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lmstudio_core::config::{ENV_BASE_URL, ENV_TIMEOUT};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lmstudio")]
#[command(about = "Prompt and inspect a local LM Studio server", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server base URL (overrides lmstudio.toml)
    #[arg(long, global = true, env = ENV_BASE_URL)]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = ENV_TIMEOUT)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a prompt and print the answer
    Prompt {
        /// The prompt to send
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Nucleus sampling probability mass
        #[arg(long)]
        top_p: Option<f32>,

        /// Maximum number of tokens to generate
        #[arg(long)]
        max_tokens: Option<i32>,

        /// Stop sequence (repeatable)
        #[arg(long)]
        stop: Vec<String>,

        /// JSON schema the answer must follow
        #[arg(long)]
        schema: Option<String>,

        /// Print the model's thinking before the answer
        #[arg(long)]
        show_thinking: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the models the server offers
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed texts and print the vectors as JSON
    Embed {
        /// Texts to embed
        #[arg(required = true)]
        texts: Vec<String>,

        /// Embedding model to use
        #[arg(short, long)]
        model: String,
    },
}

/// `RUST_LOG` wins when set and valid; otherwise `--verbose` picks debug or warn.
fn log_filter(verbose: bool, rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.base_url, cli.timeout)?;

    match cli.command {
        Commands::Prompt {
            prompt,
            model,
            system,
            no_stream,
            temperature,
            top_p,
            max_tokens,
            stop,
            schema,
            show_thinking,
            json,
        } => {
            let args = commands::PromptArgs {
                text: prompt.join(" "),
                model,
                system,
                stream: !no_stream,
                options: lmstudio_core::Options {
                    temperature,
                    top_p,
                    max_tokens,
                    stop: (!stop.is_empty()).then_some(stop),
                },
                schema,
                show_thinking,
                json,
            };
            commands::prompt(&config, args).await
        }
        Commands::Models { json } => commands::models(&config, json).await,
        Commands::Embed { texts, model } => commands::embed(&config, &model, &texts).await,
    }
}
