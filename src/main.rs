use anyhow::Result;
use postmaster_proxy::config::Settings;
use postmaster_proxy::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let app = Application::new()?;

    init_tracing(app.settings());

    info!(
        environment = %app.settings().application.environment,
        "Starting Postmaster proxy"
    );

    app.run().await?;

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}
