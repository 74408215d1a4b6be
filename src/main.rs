//! Assistant runner - terminal client for hosted assistant runs
//!
//! Drives an assistant thread through the run lifecycle: post a message,
//! start a run, poll it, answer tool calls with local actions and reload
//! the thread when the run completes.

mod actions;
mod assistants;
mod config;
mod db;
mod repl;
mod session;
mod state_machine;

use assistants::openai_factory;
use config::Config;
use db::Database;
use repl::{Repl, TerminalDisplay};
use session::{Session, ThreadStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    // Logs go to stderr so stdout stays a clean conversation transcript
    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_runner=info".into()),
        )
        .with(fmt_layer)
        .init();

    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(path = %config.db_path.display(), profile = %config.profile, "Opening database");
    let db = Database::open(&config.db_path)?;
    for setting in db.list_settings()? {
        tracing::debug!(
            key = %setting.key,
            value = %setting.value,
            updated_at = %setting.updated_at,
            "Stored setting"
        );
    }
    let store: Arc<dyn ThreadStore> = Arc::new(db);

    let display = Arc::new(TerminalDisplay::stdout());
    let session = Session::new(
        config.session.clone(),
        openai_factory(&config.base_url),
        store,
        display.clone(),
    )
    .await?;

    tracing::info!(
        assistant_id = %config.session.assistant_id,
        base_url = %config.base_url,
        "Assistant runner ready"
    );

    Repl::new(session, display).run(config.api_key).await?;
    Ok(())
}
