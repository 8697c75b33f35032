//! SMART-on-FHIR Demo Client - Entry Point

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use smart_fhir_demo::{
    config::{Config, SmartSettings, defaults},
    server::SmartApp,
};

#[derive(Parser, Debug)]
#[command(name = "smart-fhir-demo")]
#[command(about = "SMART-on-FHIR demo client: EHR launch, token exchange and document download")]
#[command(version)]
struct Cli {
    /// OAuth2 client id registered with the authorization server
    #[arg(long, default_value = defaults::APP_ID, env = "SMART_APP_ID")]
    app_id: String,

    /// FHIR base URL used for standalone launches
    #[arg(long, default_value = defaults::API_BASE, env = "SMART_API_BASE")]
    api_base: String,

    /// Redirect URI registered for this app
    #[arg(long, default_value = defaults::REDIRECT_URI, env = "SMART_REDIRECT_URI")]
    redirect_uri: String,

    /// Space-separated scopes to request
    #[arg(long, default_value = defaults::SCOPE, env = "SMART_SCOPE")]
    scope: String,

    /// Client secret (makes this a confidential client)
    #[arg(long, env = "SMART_CLIENT_SECRET")]
    client_secret: Option<String>,

    /// Directory attachments are written to
    #[arg(long, default_value = ".", env = "DOWNLOAD_DIR")]
    download_dir: PathBuf,

    /// HTTP server port
    #[arg(long, default_value_t = defaults::PORT, env = "PORT")]
    port: u16,

    /// Idle lifetime of a session, in seconds
    #[arg(long, env = "SESSION_TTL_SECS")]
    session_ttl_secs: Option<u64>,

    /// Timeout for outbound FHIR and token requests, in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let settings = SmartSettings::new(self.app_id, &self.api_base, self.redirect_uri, self.scope);
        let mut config = Config::new(settings, self.client_secret);
        config.download_dir = self.download_dir;
        if let Some(secs) = self.session_ttl_secs {
            config.session_ttl = Duration::from_secs(secs);
        }
        config.request_timeout = self.request_timeout_secs.map(Duration::from_secs);
        config
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting SMART-on-FHIR demo");

    let port = cli.port;
    let app = SmartApp::new(cli.into_config())?;
    app.run_http(port).await
}
