use std::sync::Arc;

use mail_triage::config::TriageConfig;
use mail_triage::error::Error;
use mail_triage::inference::create_runtime;
use mail_triage::mail::{GraphMailClient, MailProvider};
use mail_triage::pipeline::{Classifier, TriageProcessor};
use mail_triage::server::triage_routes;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TriageConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export MAIL_ACCESS_TOKEN=... MAILBOX_ID=...");
        std::process::exit(1);
    });

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.graph.mailbox_id);
    eprintln!("   Mail API: {}", config.graph.base_url);
    for (category, target) in config.routes.outcomes() {
        match target {
            Some(r) => eprintln!("   Route: {category} → {} <{}>", r.name, r.address),
            None => eprintln!("   Route: {category} → (no forward)"),
        }
    }

    // ── Models ──────────────────────────────────────────────────────────
    // Loaded once; shared read-only by every request until shutdown.
    let runtime = create_runtime(
        &config.inference,
        &[&config.category_model, &config.sentiment_model],
    )?;
    let category = Classifier::new(
        config.category_model.clone(),
        config.category_labels.clone(),
        Arc::clone(&runtime),
    );
    let sentiment = Classifier::new(
        config.sentiment_model.clone(),
        config.sentiment_labels.clone(),
        runtime,
    );
    eprintln!(
        "   Models: {} / {} ({:?})",
        category.model(),
        sentiment.model(),
        config.inference.backend
    );

    // ── Mail provider ───────────────────────────────────────────────────
    let mail: Arc<dyn MailProvider> = Arc::new(GraphMailClient::new(config.graph.clone())?);

    let processor = Arc::new(
        TriageProcessor::new(mail, category, sentiment, config.routes.clone())
            .with_forward_comment(config.forward_comment.clone()),
    );

    let app = triage_routes(processor);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Triage server started");
    eprintln!("   Trigger: http://0.0.0.0:{}/predict\n", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
