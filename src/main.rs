use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ryze::auth::{ApiTokenHasher, generate_session_secret};
use ryze::config::{FileConfig, ServerConfig};
use ryze::server::{AppState, create_router};
use ryze::store::{SqliteStore, Store};
use ryze::types::{Token, User, UserType};

const NOT_INITIALIZED: &str =
    "Server not initialized. Run 'ryze admin init' first to create the database and admin token.";

fn create_token(
    hasher: &ApiTokenHasher,
    is_admin: bool,
    user_id: Option<String>,
) -> anyhow::Result<(Token, String)> {
    let issued = hasher.issue()?;
    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: issued.hash,
        token_lookup: issued.lookup,
        is_admin,
        user_id,
        created_at: Utc::now(),
        expires_at: None,
        last_used_at: None,
    };
    Ok((token, issued.raw))
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

fn write_secret_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    set_restrictive_permissions(path);
    Ok(())
}

#[derive(Parser)]
#[command(name = "ryze")]
#[command(about = "Collaboration server for clients and developers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file; command-line flags take precedence
        #[arg(long, env = "RYZE_CONFIG")]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database and attachments
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Public base URL for external access (e.g., "https://ryze.example.com").
        /// Used to build participant access links.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database, admin token and session secret)
    Init {
        /// Data directory for the database and attachments
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn run_init(data_dir: PathBuf, non_interactive: bool) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;

    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = config.data_dir.join(".admin_token");

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let hasher = ApiTokenHasher::new()?;
    let (token, raw_token) = create_token(&hasher, true, None)?;

    store.create_token(&token)?;
    write_secret_file(&token_file, &raw_token)?;

    let secret_file = config.session_secret_path();
    if !secret_file.exists() {
        write_secret_file(&secret_file, &generate_session_secret())?;
    }

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("Session secret written to: {}", secret_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_default_user_prompt(&store, &hasher)?;
    }

    Ok(())
}

fn create_default_user_prompt(store: &SqliteStore, hasher: &ApiTokenHasher) -> anyhow::Result<()> {
    let create_user = inquire::Confirm::new("Would you like to create a default user?")
        .with_default(false)
        .prompt()?;

    if !create_user {
        return Ok(());
    }

    let username = inquire::Text::new("Username:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Username cannot be empty".into())
            } else if input.contains(char::is_whitespace) {
                Err("Username cannot contain whitespace".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let email = inquire::Text::new("Email:")
        .with_validator(|input: &str| {
            if input.contains('@') {
                Ok(inquire::validator::Validation::Valid)
            } else {
                Err("Enter a valid email address".into())
            }
        })
        .prompt()?;

    let user_type = inquire::Select::new("Account type:", vec!["developer", "client"])
        .prompt()?
        .parse::<UserType>()
        .map_err(anyhow::Error::msg)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        email: email.trim().to_ascii_lowercase(),
        user_type,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let (user_token, raw_token) = create_token(hasher, false, Some(user.id.clone()))?;
    store.create_token(&user_token)?;

    println!();
    println!("========================================");
    println!("Created {} '{username}' with token:", user_type.as_str());
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let token_file = config.data_dir.join(".admin_token");
    if !token_file.exists() {
        bail!(NOT_INITIALIZED);
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(NOT_INITIALIZED);
    }

    let secret = match fs::read_to_string(config.session_secret_path()) {
        Ok(secret) => secret.trim().to_string(),
        Err(_) => bail!(
            "Session secret missing at {}. Run 'ryze admin init' to create it.",
            config.session_secret_path().display()
        ),
    };

    info!("Admin token available at {}", token_file.display());

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(Arc::new(store), config, &secret)?);
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ryze=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                run_init(data_dir, non_interactive)?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let mut server_config = ServerConfig::default();
            if let Some(path) = config {
                server_config = server_config.with_file(FileConfig::load(&path)?);
            }
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(data_dir) = data_dir {
                server_config.data_dir = data_dir;
            }
            if public_base_url.is_some() {
                server_config.public_base_url = public_base_url;
            }

            run_serve(server_config).await?;
        }
    }

    Ok(())
}
