use std::sync::Arc;

use clap::{Parser, ValueEnum};
use nagios_core::{ConnectionConfig, ConnectionSettings};
use nagios_mcp_runtime::{HttpFetcher, McpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Parser, Debug)]
#[command(
    name = "nagios-mcp",
    version,
    about = "Nagios MCP server: read-only Nagios Core status and configuration tools"
)]
struct Cli {
    /// Nagios web root, e.g. http://nagios.example.com/nagios
    #[arg(long, env = "NAGIOS_URL")]
    nagios_url: Option<String>,

    /// HTTP basic-auth user
    #[arg(long, env = "NAGIOS_USER")]
    nagios_user: Option<String>,

    /// HTTP basic-auth password
    #[arg(long, env = "NAGIOS_PASS", hide_env_values = true)]
    nagios_pass: Option<String>,

    /// CGI directory below the web root
    #[arg(long, env = "NAGIOS_CGI_PATH", default_value = nagios_core::config::DEFAULT_CGI_PATH)]
    cgi_path: String,

    /// Per-request timeout towards Nagios
    #[arg(long, env = "NAGIOS_TIMEOUT_SECS", default_value_t = nagios_core::config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[arg(long, env = "NAGIOS_MCP_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Bind host for the http transport
    #[arg(long, env = "NAGIOS_MCP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Bind port for the http transport
    #[arg(long, env = "NAGIOS_MCP_PORT", default_value_t = 8000)]
    port: u16,
}

impl Cli {
    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            base_url: self.nagios_url.clone(),
            username: self.nagios_user.clone(),
            password: self.nagios_pass.clone(),
            cgi_path: Some(self.cgi_path.clone()),
            timeout_secs: Some(self.timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Structured JSON logging on stderr; stdout belongs to the protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nagios_mcp=info,nagios_mcp_runtime=info,nagios_core=info".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match ConnectionConfig::from_settings(cli.connection_settings()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return 1;
        }
    };
    tracing::info!(
        base_url = config.base_url(),
        cgi_path = config.cgi_path(),
        authenticated = config.credentials().is_some(),
        timeout_secs = config.timeout().as_secs(),
        "Nagios connection configured"
    );

    let fetcher = match HttpFetcher::new(config) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize HTTP client");
            return 1;
        }
    };
    let server = McpServer::new(fetcher);

    let result = match cli.transport {
        Transport::Stdio => server.serve_stdio().await,
        Transport::Http => http::serve(server, &cli.host, cli.port).await,
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "MCP server stopped");
            1
        }
    }
}
