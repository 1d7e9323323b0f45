use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qauth", version, about = "OAuth2/OIDC login sessions for a SQL query engine")]
struct Cli {
    /// Path to a qauth.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a login and print the authorization URL
    Login {
        /// Print the URL without opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Wait on the loopback redirect URI and finish the login
        #[arg(long)]
        listen: bool,

        /// Callback timeout in milliseconds
        #[arg(long, env = "QAUTH_OAUTH_TIMEOUT_MS")]
        oauth_timeout: Option<u64>,
    },

    /// Finish a login with the URL the provider redirected to
    Callback {
        /// Full redirect URL, including the query string
        url: String,
    },

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Show the session state
    Status {
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Clear the session
    Logout,

    /// Run a SQL query with the session's token
    Query {
        /// SQL text
        sql: String,

        /// JSON output
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        matches!(
            self,
            Commands::Status { json: true } | Commands::Query { json: true, .. }
        )
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QAUTH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.command.json();

    if let Err(e) = run(cli).await {
        qauth::cli::output::print_error(&e, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), qauth::QauthError> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Login {
            no_browser,
            listen,
            oauth_timeout,
        } => {
            let timeout = std::time::Duration::from_millis(
                oauth_timeout.unwrap_or(qauth::cli::auth::DEFAULT_OAUTH_TIMEOUT_MS),
            );
            qauth::cli::auth::run_login(config, no_browser, listen, timeout).await
        }
        Commands::Callback { url } => qauth::cli::auth::run_callback(config, &url).await,
        Commands::Token => qauth::cli::auth::run_token(config).await,
        Commands::Status { json } => qauth::cli::auth::run_status(config, json).await,
        Commands::Logout => qauth::cli::auth::run_logout(config).await,
        Commands::Query { sql, json } => qauth::cli::query::run_query(config, &sql, json).await,
    }
}
