use anyhow::Context;
use clap::Args;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::{AuthUser, UserId};
use crate::cli::utils::{output_fragment, output_json_line, output_value};
use crate::cli::OutputFormat;
use crate::config;
use crate::relay::{GenerationRequest, RelayDefaults, SingleShotRelay, StreamEvent, StreamRelay};
use crate::store::{MemoryStore, RowStore};
use crate::upstream::{HttpUpstream, UpstreamClient};

#[derive(Args, Debug)]
pub struct AskArgs {
    #[arg(help = "Prompt to send")]
    pub prompt: String,

    #[arg(long, help = "Model id (defaults to AI_MODEL)")]
    pub model: Option<String>,

    #[arg(long, help = "Sampling temperature between 0.0 and 1.0")]
    pub temperature: Option<f64>,

    #[arg(long, help = "Output token ceiling between 32 and 4096")]
    pub max_tokens: Option<i64>,

    #[arg(long, help = "Wait for the whole answer instead of streaming tokens")]
    pub once: bool,
}

pub async fn handle(args: AskArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();
    let request = GenerationRequest::new(args.prompt, args.temperature, args.model, args.max_tokens)?;

    let upstream: Arc<dyn UpstreamClient> = Arc::new(HttpUpstream::new(&config.upstream)?);
    // Answers are recorded in a throwaway store so the relay behaves exactly as it does when serving
    let store: Arc<dyn RowStore> = Arc::new(MemoryStore::new());
    let defaults = RelayDefaults::from(&config.upstream);
    let owner = AuthUser {
        id: UserId("cli".to_string()),
        token: String::new(),
    };

    if args.once {
        let relay = SingleShotRelay::new(upstream, store, defaults);
        let answer = relay.run(&request, &owner).await?;
        let value = serde_json::to_value(&answer)?;
        return output_value(output_format, &value, || answer.answer.clone());
    }

    let relay = StreamRelay::new(upstream, store, defaults);
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let task = tokio::spawn(async move { relay.run(request, owner, event_tx).await });

    let mut failure = None;
    while let Some(event) = event_rx.recv().await {
        match output_format {
            OutputFormat::Json => output_json_line(&serde_json::to_value(&event)?)?,
            OutputFormat::Text => match &event {
                StreamEvent::Token { text } => output_fragment(text)?,
                StreamEvent::End => println!(),
                StreamEvent::Error { .. } => {}
            },
        }
        if let StreamEvent::Error { message } = event {
            failure = Some(message);
        }
    }

    let outcome = task.await.context("relay task panicked")?;
    tracing::debug!(status = ?outcome.status(), tokens = outcome.tokens(), "ask finished");

    match failure {
        Some(message) => anyhow::bail!("upstream error: {}", message),
        None => Ok(()),
    }
}
