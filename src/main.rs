use slack_workflow_binding::config::{load_settings, FileConfigStore, SlackConfig};
use slack_workflow_binding::resolver::initialize_slack_config;
use slack_workflow_binding::slack::SlackAdapter;
use slack_workflow_binding::workflow::{serve, WorkflowBinding};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries invocation results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("slack_workflow_binding=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    tracing::info!(
        "Starting Slack workflow binding v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = load_settings()?;
    tracing::info!(
        "Slack API at {}, config in {:?}",
        settings.api_base_url,
        settings.config_dir
    );

    let store = Arc::new(FileConfigStore::new(&settings.config_dir));
    let initialized = initialize_slack_config(
        settings.initial.clone(),
        SlackConfig::with_store(store),
        &settings.integrations_file,
    );
    if initialized.integration.is_none() {
        tracing::info!("No integration manager, using local configuration only");
    }

    let adapter = SlackAdapter::new(&settings.api_base_url, initialized.resolver())?;
    let binding = WorkflowBinding::new(adapter, initialized.config.clone());

    tracing::info!("Ready for invocations on stdin. Press Ctrl+C to shutdown.");

    let mut stdout = tokio::io::stdout();
    serve(
        Arc::new(binding),
        BufReader::new(tokio::io::stdin()),
        &mut stdout,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        },
    )
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
