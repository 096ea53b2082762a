mod cli;

use anyhow::{Context, Result};
use chat_stream::config::{load_config, PendingMessagePolicy, StreamConfig};
use chat_stream::conversation::Conversation;
use chat_stream::logging::setup_logging;
use chat_stream::persistence::InMemoryMessageStore;
use chat_stream::session::{ChatStatusRegistry, StreamOutcome};
use chat_stream::types::ChatMessage;
use chat_stream::{ContentPipeline, ParseMode, StreamCoordinator, StreamEvent};
use cli::{Args, Command};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use upstream::recording::load_recordings;
use upstream::{
    ChunkStream, PlaybackChunkStream, RecordingChunkStream, TransportError, WebhookClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    setup_logging(args.verbose, false);

    let mut config = load_config().context("Failed to load configuration")?;
    config.pipeline = args.pipeline_config(config.pipeline);
    let pipeline = Arc::new(ContentPipeline::from_config(&config.pipeline));
    debug!("Pipeline stages: {:?}", pipeline.stage_names());

    match args.command {
        Command::Parse { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = pipeline.parse(&raw, ParseMode::Final);
            let payloads: Vec<_> = result.payloads.iter().map(|p| p.to_ui_part()).collect();
            print_json(&json!({
                "displayText": result.display_text,
                "payloads": payloads,
                "isAwaitingMoreInput": result.is_awaiting_more_input,
            }))
        }
        Command::Replay {
            file,
            chunk_size,
            fast,
            message,
        } => {
            let mut source = open_replay(&file, chunk_size, fast)?;
            let conversation = Conversation::new(
                "replay",
                vec![ChatMessage::user_text(message)],
                &config.greeting_message,
                PendingMessagePolicy::AutoBootstrap,
            );
            let mut coordinator = StreamCoordinator::new(
                conversation,
                pipeline,
                config.stream.clone(),
                Arc::new(InMemoryMessageStore::new()),
            )
            .with_existing_title();

            coordinator
                .bootstrap_pending()
                .await?
                .context("Nothing to replay")?;
            let outcome = run_stream(&mut coordinator, &mut source).await?;
            print_outcome(&outcome)
        }
        Command::Send {
            message,
            chat_id,
            user_id,
            username,
            record,
        } => {
            let request = SendRequest {
                chat_id: &chat_id,
                message: &message,
                user_id: &user_id,
                username: &username,
            };
            send(&config, pipeline, request, record.as_deref()).await
        }
    }
}

struct SendRequest<'a> {
    chat_id: &'a str,
    message: &'a str,
    user_id: &'a str,
    username: &'a str,
}

async fn send(
    config: &StreamConfig,
    pipeline: Arc<ContentPipeline>,
    request: SendRequest<'_>,
    record: Option<&Path>,
) -> Result<()> {
    let url = config
        .webhook
        .url
        .clone()
        .context("No webhook URL configured, set CHAT_STREAM_WEBHOOK_URL")?;
    let client = WebhookClient::new(url, config.webhook.token.clone());

    let conversation = Conversation::new(
        request.chat_id,
        Vec::new(),
        &config.greeting_message,
        config.stream.pending_message,
    );
    let mut coordinator = StreamCoordinator::new(
        conversation,
        pipeline,
        config.stream.clone(),
        Arc::new(InMemoryMessageStore::new()),
    );
    if let Some(title_url) = &config.webhook.title_url {
        coordinator =
            coordinator.with_title_client(WebhookClient::new(title_url, config.webhook.token.clone()));
    }

    let Some(outgoing) = coordinator.begin_send(request.message).await? else {
        anyhow::bail!("Message is empty");
    };
    let request = outgoing.to_request(request.user_id, request.username);

    let outcome = match client.open_stream(&request).await {
        Ok(stream) => match record {
            Some(path) => {
                let body = serde_json::to_value(&request)?;
                let mut source = RecordingChunkStream::new(stream, path, body);
                run_stream(&mut coordinator, &mut source).await?
            }
            None => {
                let mut source = stream;
                run_stream(&mut coordinator, &mut source).await?
            }
        },
        Err(e) => {
            let mut registry = ChatStatusRegistry::new();
            coordinator.abort_send(e.to_string(), &mut registry)?
        }
    };

    print_outcome(&outcome)
}

/// A recording file plays back its first session, anything else is a raw body
fn open_replay(path: &Path, chunk_size: usize, fast: bool) -> Result<PlaybackChunkStream> {
    match load_recordings(path) {
        Ok(sessions) => {
            let session = sessions.into_iter().next().ok_or_else(|| {
                TransportError::Recording(format!("{} contains no sessions", path.display()))
            })?;
            info!("Replaying {} recorded chunks", session.chunks.len());
            Ok(PlaybackChunkStream::new(session.chunks, fast))
        }
        Err(TransportError::Json(_)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            debug!("Replaying {} raw bytes", bytes.len());
            Ok(PlaybackChunkStream::from_bytes(&bytes, chunk_size))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// Drive one response, printing updates as they arrive. Ctrl-C cancels.
async fn run_stream<S>(coordinator: &mut StreamCoordinator, source: &mut S) -> Result<StreamOutcome>
where
    S: ChunkStream + ?Sized,
{
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx);

    let mut registry = ChatStatusRegistry::new();
    let outcome = coordinator.drive(source, &cancel, &mut registry, &tx).await;
    drop(tx);
    printer.await.context("Printer task failed")?;
    cancel.cancel();

    Ok(outcome?)
}

fn spawn_printer(mut rx: mpsc::Receiver<StreamEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Update(update) = event {
                let payloads: Vec<_> = update.new_payloads.iter().map(|p| p.to_ui_part()).collect();
                println!(
                    "{}",
                    json!({
                        "displayText": update.display_text,
                        "newPayloads": payloads,
                        "isAwaitingMoreInput": update.is_awaiting_more_input,
                        "state": update.text_state,
                    })
                );
            }
        }
    })
}

fn print_outcome(outcome: &StreamOutcome) -> Result<()> {
    info!("Response ended with status {:?}", outcome.status);
    print_json(&json!({ "parts": outcome.parts() }))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
