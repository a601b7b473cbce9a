use microscope_server::{config, start_app};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OPENAI_API_KEY usually lives in .env during development.
    dotenv::dotenv().ok();

    let config = config::get_configuration()?;
    let default_directives = format!("{},ort=info", config.log_level.as_str());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()))
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();

    start_app(config).await
}
