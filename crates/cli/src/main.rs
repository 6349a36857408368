use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use atendo_config::{AtendoConfig, load_config};

#[derive(Parser)]
#[command(name = "atendo", about = "Atendo — WhatsApp unified inbox gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Gateway base URL used by the client subcommands.
    #[arg(
        long,
        global = true,
        env = "ATENDO_GATEWAY_URL",
        default_value = "http://127.0.0.1:18790"
    )]
    gateway_url: String,

    // Gateway arguments (used when no subcommand is provided, or with the
    // `gateway` subcommand).
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config file (overrides discovery).
    #[arg(long, global = true, env = "ATENDO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Send a message through a running gateway.
    Send {
        /// Destination number (digits, with or without formatting).
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
    /// List the chat roster of a running gateway.
    Chats,
    /// Database management.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Print the resolved database path.
    Path,
    /// Delete the database file.
    Reset,
}

fn init_tracing(level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => atendo_config::discover_and_load(),
    };
    if let Some(bind) = cli.bind.clone() {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    match cli.command.unwrap_or(Commands::Gateway) {
        Commands::Gateway => atendo_gateway::start_gateway(config).await,
        Commands::Send { to, message } => send_message(&cli.gateway_url, &to, &message).await,
        Commands::Chats => list_chats(&cli.gateway_url).await,
        Commands::Db { action } => db_command(&config, action),
    }
}

async fn send_message(gateway_url: &str, to: &str, message: &str) -> anyhow::Result<()> {
    let resp = reqwest::Client::new()
        .post(format!("{gateway_url}/api/messages"))
        .json(&serde_json::json!({"number": to, "text": message}))
        .send()
        .await?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!(
            "send failed ({status}): {}",
            body["error"].as_str().unwrap_or("unknown error")
        );
    }

    println!(
        "sent to chat {} (message {})",
        body["chat"]["id"].as_str().unwrap_or("?"),
        body["message"]["id"].as_str().unwrap_or("?")
    );
    Ok(())
}

async fn list_chats(gateway_url: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = reqwest::get(format!("{gateway_url}/api/chats"))
        .await?
        .error_for_status()?
        .json()
        .await?;

    let chats = body["chats"].as_array().cloned().unwrap_or_default();
    if chats.is_empty() {
        println!("no chats");
        return Ok(());
    }
    for chat in chats {
        println!(
            "{}  unread={}  {}  {}",
            chat["id"].as_str().unwrap_or("?"),
            chat["unreadCount"].as_i64().unwrap_or(0),
            chat["externalContactId"].as_str().unwrap_or("?"),
            chat["lastMessage"].as_str().unwrap_or(""),
        );
    }
    Ok(())
}

fn db_command(config: &AtendoConfig, action: DbAction) -> anyhow::Result<()> {
    match action {
        DbAction::Path => {
            println!("{}", config.database.path);
            Ok(())
        },
        DbAction::Reset => {
            let path = &config.database.path;
            if path == ":memory:" {
                println!("in-memory database, nothing to reset");
                return Ok(());
            }
            if std::path::Path::new(path).exists() {
                std::fs::remove_file(path)?;
                info!(path, "database removed");
                println!("removed {path}");
            } else {
                println!("no database at {path}");
            }
            Ok(())
        },
    }
}
