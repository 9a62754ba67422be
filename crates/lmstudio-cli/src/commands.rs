//! CLI commands implementation

use std::io::{self, Write};

use anyhow::{Context, Result};
use lmstudio_core::{
    chat_registrations, embedding_registrations, Completion, Config, LmStudioClient,
    LmStudioEmbeddingModel, LmStudioError, LmStudioModel, ModelCatalog, ModelRegistration,
    Options, Prompt,
};
use serde_json::json;

// ANSI color codes
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

pub struct PromptArgs {
    pub text: String,
    pub model: Option<String>,
    pub system: Option<String>,
    pub stream: bool,
    pub options: Options,
    /// Raw JSON schema text
    pub schema: Option<String>,
    pub show_thinking: bool,
    pub json: bool,
}

/// Load lmstudio.toml plus environment, then apply command-line overrides
pub fn load_config(base_url: Option<String>, timeout: Option<u64>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load lmstudio.toml")?;
    if let Some(url) = base_url {
        config.server.base_url = url;
    }
    if timeout.is_some() {
        config.server.timeout_secs = timeout;
    }
    Ok(config)
}

/// Turn an adapter error into the message a user should see
fn explain(err: LmStudioError) -> anyhow::Error {
    if err.is_connection() {
        anyhow::anyhow!("server unreachable: {err}")
    } else {
        anyhow::anyhow!("unexpected server output: {err}")
    }
}

fn client(config: &Config) -> Result<LmStudioClient> {
    LmStudioClient::from_config(config).map_err(explain)
}

/// Send one prompt and print the answer
pub async fn prompt(config: &Config, args: PromptArgs) -> Result<()> {
    let model_id = args
        .model
        .or_else(|| config.defaults.model.clone())
        .context("No model given; pass -m or set defaults.model in lmstudio.toml")?;

    let mut prompt = Prompt::new(args.text).with_options(args.options);
    if let Some(system) = args.system.or_else(|| config.defaults.system.clone()) {
        prompt = prompt.with_system(system);
    }
    if let Some(raw) = args.schema {
        let schema: serde_json::Value =
            serde_json::from_str(&raw).context("--schema must be valid JSON")?;
        prompt = prompt.with_schema(schema);
    }

    let model = LmStudioModel::new(client(config)?, model_id);
    let echo = args.stream && !args.show_thinking && !args.json;

    let mut printer = DeltaPrinter::new(io::stdout());
    let completion = model
        .execute(&prompt, None, args.stream, |delta| {
            if echo {
                printer.print(delta);
            }
        })
        .await
        .map_err(explain)?;
    printer.finish().context("Failed to write to stdout")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&completion_json(model.model_id(), &completion))?);
    } else if echo {
        println!();
    } else {
        if args.show_thinking && completion.thinking.has_thinking() {
            println!("{DIM}Thinking:{RESET}");
            println!("{DIM}{}{RESET}\n", completion.thinking.thinking);
        }
        println!("{}", completion.text());
    }

    Ok(())
}

/// Writes streamed deltas as they arrive. After the first failed write
/// (a closed pipe, say) nothing more is written and the error is kept.
struct DeltaPrinter<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> DeltaPrinter<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn print(&mut self, delta: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = write!(self.out, "{delta}").and_then(|()| self.out.flush()) {
            self.error = Some(e);
        }
    }

    fn finish(self) -> io::Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

fn completion_json(model_id: &str, completion: &Completion) -> serde_json::Value {
    json!({
        "model": model_id,
        "text": completion.text(),
        "thinking": completion.thinking.has_thinking().then_some(&completion.thinking.thinking),
        "finish_reason": completion.response.finish_reason,
        "usage": completion.response.usage,
        "tool_calls": completion.tool_calls.calls(),
    })
}

/// List chat and embedding models
pub async fn models(config: &Config, json: bool) -> Result<()> {
    let catalog = ModelCatalog::new(client(config)?);
    let chat = chat_registrations(&catalog).await.map_err(explain)?;
    let embedding = embedding_registrations(&catalog).await;

    if json {
        let entry = |r: &ModelRegistration| json!({"model_id": r.model_id, "aliases": r.aliases});
        let out = json!({
            "chat": chat.iter().map(entry).collect::<Vec<_>>(),
            "embedding": embedding.iter().map(entry).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{BOLD}Chat Models ({}){RESET}", chat.len());
    for r in &chat {
        if r.aliases.is_empty() {
            println!("  - {}", r.model_id);
        } else {
            println!("  - {} {DIM}(alias: {}){RESET}", r.model_id, r.aliases.join(", "));
        }
    }

    println!("\n{BOLD}Embedding Models ({}){RESET}", embedding.len());
    for r in &embedding {
        println!("  - {}", r.model_id);
    }

    Ok(())
}

/// Embed texts and print the vectors
pub async fn embed(config: &Config, model_id: &str, texts: &[String]) -> Result<()> {
    let model = LmStudioEmbeddingModel::new(client(config)?, model_id);
    let vectors = model.embed_batch(texts).await.map_err(explain)?;
    println!("{}", serde_json::to_string(&vectors)?);
    Ok(())
}
