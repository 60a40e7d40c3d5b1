#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use anyhow::Context as _;
use args::{Args, ChatArgs, Command};
use clap::Parser;
use futures_util::StreamExt;
use prism_config::Config;
use prism_core::ExecutionContext;
use prism_llm::types::Usage;
use prism_llm::responses::{ResponsesInput, ResponsesRequest};
use prism_llm::{ChatOutcome, ChatRequest, HttpProvider, Message, Provider};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    // Logs go to the subscriber, replies to stdout
    let _telemetry_guard = prism_telemetry::init(&config.telemetry, "warn")?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            shutdown_clone.cancel();
        }
    });

    let ctx = ExecutionContext::new()
        .with_parent(&shutdown)
        .with_large_payload(config.large_payload.map(Into::into));

    match args.command {
        Command::Chat(chat_args) => chat(&config, chat_args, ctx).await,
        Command::Responses(chat_args) => responses(&config, chat_args, ctx).await,
        Command::Models { provider } => models(&config, &provider, &ctx).await,
    }
}

fn provider(config: &Config, name: &str) -> anyhow::Result<HttpProvider> {
    let provider_config = config
        .provider(name)
        .with_context(|| format!("provider '{name}' is not configured"))?;

    Ok(HttpProvider::new(name, provider_config)?)
}

async fn chat(config: &Config, args: ChatArgs, ctx: ExecutionContext) -> anyhow::Result<()> {
    let provider = provider(config, &args.provider)?;
    let ctx = ctx.with_raw_response(args.raw);

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt));
    let request = ChatRequest::new(args.model, messages);

    let mut stdout = tokio::io::stdout();

    if args.stream {
        let mut events = provider.chat_stream(&request, &ctx).await?;

        while let Some(event) = events.next().await {
            let event = event?;

            if let Some(content) = &event.delta.content {
                stdout.write_all(content.as_bytes()).await?;
                stdout.flush().await?;
            }
            if let Some(raw) = &event.raw {
                tracing::info!(chunk_index = event.chunk_index, raw = %raw, "upstream chunk");
            }
            if event.is_terminal {
                stdout.write_all(b"\n").await?;
                print_usage(event.usage.as_ref());
            }
        }

        return Ok(());
    }

    match provider.chat(&request, &ctx).await? {
        ChatOutcome::Response(response) => {
            let text = response.first_message().and_then(Message::text).unwrap_or_default();
            stdout.write_all(text.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            print_usage(response.usage.as_ref());
        }
        ChatOutcome::LargePayload(mut payload) => {
            tracing::warn!(
                content_length = ?payload.content_length,
                "response exceeds the large payload threshold, writing raw body"
            );
            while let Some(chunk) = payload.body.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.write_all(b"\n").await?;
            print_usage(payload.usage.as_ref());
        }
    }

    stdout.flush().await?;
    Ok(())
}

async fn responses(config: &Config, args: ChatArgs, ctx: ExecutionContext) -> anyhow::Result<()> {
    let provider = provider(config, &args.provider)?;
    let ctx = ctx.with_raw_response(args.raw);

    let mut request = ResponsesRequest::new(args.model, ResponsesInput::Text(args.prompt));
    request.instructions = args.system;

    let mut stdout = tokio::io::stdout();

    if args.stream {
        let mut events = provider.responses_stream(&request, &ctx).await?;
        while let Some(event) = events.next().await {
            let line = serde_json::to_string(&event?)?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        return Ok(());
    }

    let response = provider.responses(&request, &ctx).await?;
    stdout
        .write_all(serde_json::to_string_pretty(&response)?.as_bytes())
        .await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn models(config: &Config, name: &str, ctx: &ExecutionContext) -> anyhow::Result<()> {
    let provider = provider(config, name)?;
    let models = provider.list_models(ctx).await?;

    let mut stdout = tokio::io::stdout();
    for model in models.data {
        stdout.write_all(format!("{}\t{}\n", model.id, model.owned_by).as_bytes()).await?;
    }
    stdout.flush().await?;

    Ok(())
}

fn print_usage(usage: Option<&Usage>) {
    if let Some(usage) = usage {
        eprintln!(
            "[usage] prompt={} completion={} total={}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }
}
