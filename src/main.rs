use anyhow::Result;
use clap::Parser;
use medicare_ai::context::AppContext;
use medicare_ai::load_google_llm;
use tracing::{info, warn};

mod cli;
mod logger;
mod routes;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 文件可选
    let _ = dotenvy::dotenv();

    let args = cli::Args::parse();
    let check_connection = args.check_connection;
    let prefer_level = args.log_level.is_some();
    let settings = args.into_settings()?;

    logger::init(
        &settings.logging.level,
        prefer_level,
        settings.logging.log_file.as_deref(),
    )?;

    if settings.llm.api_key.trim().is_empty() {
        warn!("GOOGLE_API_KEY is not set, chat and analysis requests will fail");
    }
    if settings.tavily.api_key.trim().is_empty() {
        warn!("TAVILY_API_KEY is not set, research is disabled");
    }

    if check_connection {
        load_google_llm(&settings)?.check_connection().await?;
    }

    let context = AppContext::from_settings(settings)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        default_language = %context.settings().default_language,
        "starting Medicare AI"
    );

    server::serve(context).await
}
