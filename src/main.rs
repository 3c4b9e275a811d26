use anyhow::{Context, Result};
use clap::Parser;
use session_scribe::{
    create_router, AppState, Config, HttpAnalyzer, HttpTranscriber, MemoryStore, PipelineWorker,
    SessionManager, WebhookNotifier,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "session-scribe", about = "Voice session recorder and analyzer")]
struct Args {
    /// Path to a config file (without extension); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn session_scribe::SessionStore> = Arc::new(MemoryStore::new());
    let transcriber = Arc::new(HttpTranscriber::new(&cfg.transcription)?);
    let analyzer = Arc::new(HttpAnalyzer::new(&cfg.analysis)?);
    let notifier = Arc::new(WebhookNotifier::new(&cfg.notify)?);

    let (queue, jobs) = mpsc::channel(64);

    let worker = Arc::new(PipelineWorker::new(
        Arc::clone(&store),
        transcriber,
        analyzer,
        notifier,
        cfg.pipeline.clone(),
        cfg.audio.clone(),
    ));
    worker.spawn(jobs);

    let manager = Arc::new(SessionManager::new(
        Arc::clone(&store),
        queue,
        cfg.audio.clone(),
        cfg.recording.clone(),
    ));

    let state = AppState::new(manager, store);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
