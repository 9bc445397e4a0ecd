use anyhow::{Context, Result};
use diesel::prelude::*;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_ai::{AiResponder, GeminiClient, LlamaClient, OpenRouterClient};
use parley_core::call_platform::StreamClient;
use parley_core::config::Config;
use parley_core::chat::ChatResponder;
use parley_core::jobs::{spawn_worker, JobQueue, JobRunner, PgJobQueue};
use parley_core::processing::{HttpTranscriptSource, MeetingProcessor};
use parley_core::router::WebhookRouter;
use parley_core::server::{app, AppState};
use parley_core::steps::RetryPolicy;
use parley_core::storage::{MeetingStore, PgMeetingStore};

fn build_responder(config: &Config) -> Result<AiResponder> {
    let openrouter = OpenRouterClient::new(
        config.openrouter_api_key.clone(),
        &config.openrouter_api_url,
    )?;
    let anthropic = OpenRouterClient::anthropic(
        config.openrouter_api_key.clone(),
        &config.openrouter_api_url,
    )?;
    let gemini = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_api_url)?;
    let llama = LlamaClient::new(config.llama_api_key.clone(), &config.llama_api_url)?;

    let responder = AiResponder::new()
        .with_provider(Arc::new(openrouter))
        .with_provider(Arc::new(anthropic))
        .with_provider(Arc::new(gemini))
        .with_provider(Arc::new(llama))
        .with_fallback(&config.fallback_provider, &config.fallback_model);

    if !responder.has(&config.fallback_provider) {
        anyhow::bail!("Unknown fallback provider: {}", config.fallback_provider);
    }
    if !responder.has(&config.summary_provider) {
        warn!(
            "Summary provider {} is not registered, summaries will use the fallback",
            config.summary_provider
        );
    }
    if config.fallback_provider == "openrouter" && config.openrouter_api_key.is_none() {
        warn!("OPENROUTER_API_KEY not set, the fallback provider will fail");
    }

    Ok(responder)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "parley=debug,parley_core=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Parley starting up...");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Configuration loaded");
    info!("  Video API: {}", config.stream_video_url);
    info!("  Chat API: {}", config.stream_chat_url);
    info!(
        "  Summaries: {}/{}",
        config.summary_provider, config.summary_model
    );
    info!(
        "  Fallback: {}/{}",
        config.fallback_provider, config.fallback_model
    );

    let mut conn = diesel::PgConnection::establish(&config.database_url)
        .context("Failed to connect to database")?;

    // Run database migrations first
    {
        use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
        pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations applied");
    }

    let conn = Arc::new(Mutex::new(conn));
    let store: Arc<dyn MeetingStore> = Arc::new(PgMeetingStore::new(conn.clone()));
    let jobs: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(conn));

    let requeued = jobs.requeue_stale()?;
    if requeued > 0 {
        info!("Requeued {} interrupted jobs", requeued);
    }

    let platform = Arc::new(StreamClient::new(
        &config.stream_api_key,
        &config.stream_api_secret,
        &config.stream_video_url,
        &config.stream_chat_url,
    )?);
    let responder = Arc::new(build_responder(&config)?);

    let job_policy = RetryPolicy::new(config.job_step_max_attempts, config.job_step_retry_delay);
    let processor = MeetingProcessor::new(
        store.clone(),
        Arc::new(HttpTranscriptSource::new()?),
        responder.clone(),
        job_policy,
    )
    .with_summary_model(&config.summary_provider, &config.summary_model);
    let chat = ChatResponder::new(
        store.clone(),
        platform.clone(),
        responder.clone(),
        job_policy,
    );
    let runner = Arc::new(JobRunner::new(Arc::new(processor), Arc::new(chat)));
    spawn_worker(jobs.clone(), runner, config.job_poll_interval);
    info!("Job worker polling every {:?}", config.job_poll_interval);

    let router = WebhookRouter::new(
        store,
        platform,
        responder,
        jobs,
        RetryPolicy::new(config.saga_max_attempts, config.saga_retry_delay),
    );
    let state = AppState {
        router: Arc::new(router),
        webhook_secret: Arc::new(config.stream_api_secret.clone()),
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    info!("Webhook server listening on port {}", config.http_port);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
