use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error, info, warn};
use serde_json::Value;
use tokio::net::TcpListener;

use tokengate::api::{AppState, create_router};
use tokengate::auth::{TokenService, hash_password};
use tokengate::config::{self, AppConfig, AuthConfig};
use tokengate::user::{UserRecord, UsersFile};

#[tokio::main]
async fn main() {
    if let Err(err) = try_main().await {
        let _ = writeln!(io::stderr(), "error: {err:?}");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(cli.common)?;
    ctx.init_logging();

    match cli.command {
        Command::Serve(cmd) => handle_serve(&ctx, cmd).await,
        Command::Users { command } => handle_users(&ctx, command),
        Command::Token { command } => handle_token(&ctx, command),
        Command::Config { command } => handle_config(&ctx, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "tokengate - bearer-token authentication gateway.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Reduce output to errors only.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gateway.
    Serve(ServeCommand),
    /// Manage the user store.
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Work with access tokens.
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Address to bind (overrides server.host).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides server.port).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    /// Add a user.
    Add {
        username: String,
        /// Read the password from stdin without prompting.
        #[arg(long)]
        password_stdin: bool,
        /// Profile attribute, repeatable.
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Remove a user.
    Remove { username: String },
    /// Set profile attributes. An empty value removes the attribute.
    Set {
        username: String,
        #[arg(value_name = "KEY=VALUE", required = true)]
        attrs: Vec<String>,
    },
    /// Change a user's password.
    Passwd {
        username: String,
        #[arg(long)]
        password_stdin: bool,
    },
    /// List users.
    List,
}

#[derive(Debug, Subcommand)]
enum TokenCommand {
    /// Mint a token for a user without going through login.
    Issue {
        username: String,
        /// Lifetime in minutes (defaults to auth.token_ttl_minutes).
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration with secrets redacted.
    Show,
    /// Print the config file path.
    Path,
    /// Write a default config file with a fresh signing secret.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

struct RuntimeContext {
    common: CommonOpts,
    config_path: Option<PathBuf>,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = common.config.clone().or_else(config::default_config_path);
        let config = AppConfig::load(config_path.as_deref()).with_context(|| {
            format!(
                "loading configuration from {}",
                config_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "environment".to_string())
            )
        })?;

        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            return LevelFilter::Error;
        }
        let base = self
            .config
            .logging
            .level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info);
        match self.common.verbose {
            0 => base,
            1 => base.max(LevelFilter::Debug),
            _ => LevelFilter::Trace,
        }
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level().to_string().to_ascii_lowercase();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("tokengate={level},tower_http={level}"))
        });

        if self.common.json || self.config.logging.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(io::stderr().is_terminal()),
                )
                .try_init()
                .ok();
        }
    }

    fn users_path(&self) -> &Path {
        &self.config.users.path
    }

    fn load_users(&self) -> Result<UsersFile> {
        UsersFile::load(self.users_path())
            .with_context(|| format!("reading {}", self.users_path().display()))
    }

    fn save_users(&self, users: &UsersFile) -> Result<()> {
        users
            .save(self.users_path())
            .with_context(|| format!("writing {}", self.users_path().display()))
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting tokengate...");

    ctx.config.validate().context("invalid configuration")?;
    let state = AppState::from_config(&ctx.config)?;
    info!("User store: {}", ctx.users_path().display());
    info!("Backend: {}", state.forwarder.base());

    let app = create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding to {host}:{port}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections...");
}

fn handle_users(ctx: &RuntimeContext, command: UsersCommand) -> Result<()> {
    match command {
        UsersCommand::Add {
            username,
            password_stdin,
            attrs,
        } => {
            let username = username.trim().to_string();
            if username.is_empty() {
                bail!("username must not be empty");
            }
            let mut users = ctx.load_users()?;
            if users.get(&username).is_some() {
                bail!("user '{username}' already exists");
            }

            let password = read_password(password_stdin)?;
            let hash = hash_password(&password, ctx.config.auth.validate_bcrypt_cost()?)
                .context("hashing password")?;

            let mut record = UserRecord::new(&username, hash);
            for attr in &attrs {
                let (key, value) = parse_attr(attr)?;
                if let Some(value) = value {
                    record = record.with_attribute(key, value);
                }
            }
            users.insert(record)?;
            ctx.save_users(&users)?;
            info!("Added user {username}");
            println!("Added user '{username}'");
        }
        UsersCommand::Remove { username } => {
            let mut users = ctx.load_users()?;
            users.remove(&username)?;
            ctx.save_users(&users)?;
            info!("Removed user {username}");
            println!("Removed user '{username}'");
        }
        UsersCommand::Set { username, attrs } => {
            let parsed = attrs
                .iter()
                .map(|a| parse_attr(a))
                .collect::<Result<Vec<_>>>()?;

            let mut users = ctx.load_users()?;
            let record = users.get_mut(&username)?;
            for (key, value) in parsed {
                match value {
                    Some(value) => {
                        record.attributes.insert(key, value);
                    }
                    None => {
                        record.attributes.remove(&key);
                    }
                }
            }
            ctx.save_users(&users)?;
            println!("Updated user '{username}'");
        }
        UsersCommand::Passwd {
            username,
            password_stdin,
        } => {
            let mut users = ctx.load_users()?;
            let password = read_password(password_stdin)?;
            let hash = hash_password(&password, ctx.config.auth.validate_bcrypt_cost()?)
                .context("hashing password")?;
            users.get_mut(&username)?.password_hash = hash;
            ctx.save_users(&users)?;
            info!("Changed password for {username}");
            println!("Password updated for '{username}'");
        }
        UsersCommand::List => {
            let users = ctx.load_users()?;
            if users.users.is_empty() {
                println!("No users in {}", ctx.users_path().display());
            }
            for user in &users.users {
                if user.attributes.is_empty() {
                    println!("{}", user.username);
                } else {
                    println!(
                        "{}\t{}",
                        user.username,
                        serde_json::to_string(&user.attributes)?
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_token(ctx: &RuntimeContext, command: TokenCommand) -> Result<()> {
    match command {
        TokenCommand::Issue {
            username,
            ttl_minutes,
        } => {
            let settings = ctx
                .config
                .auth
                .token_settings()
                .context("invalid auth configuration")?;
            let service = TokenService::new(settings);

            if ctx.load_users()?.get(&username).is_none() {
                warn!("User {username} is not in the user store; the token will be rejected with 404");
            }

            let token = match ttl_minutes {
                Some(minutes) => service.issue_with_ttl(&username, ttl_from_minutes(minutes)?),
                None => service.issue(&username),
            }
            .context("signing token")?;

            println!("{}", token.as_str());
        }
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(&ctx.config.redacted())
                .context("rendering configuration")?;
            print!("{rendered}");
        }
        ConfigCommand::Path => {
            let path = ctx
                .config_path
                .as_deref()
                .ok_or_else(|| anyhow!("no config directory available on this platform"))?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = ctx
                .config_path
                .as_deref()
                .ok_or_else(|| anyhow!("no config directory available; pass --config PATH"))?;
            if path.exists() && !force {
                bail!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                );
            }

            let mut fresh = AppConfig::default();
            fresh.auth.jwt_secret = Some(AuthConfig::generate_jwt_secret());
            let rendered =
                toml::to_string_pretty(&fresh).context("rendering default configuration")?;

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote default configuration to {}", path.display());
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Positive, representable lifetime for `--ttl-minutes`.
fn ttl_from_minutes(minutes: i64) -> Result<chrono::TimeDelta> {
    match chrono::TimeDelta::try_minutes(minutes) {
        Some(ttl) if minutes > 0 => Ok(ttl),
        Some(_) => bail!("--ttl-minutes must be positive, got {minutes}"),
        None => bail!("--ttl-minutes {minutes} is out of range"),
    }
}

/// Read one line from stdin, prompting on stderr when interactive.
fn read_password(from_stdin: bool) -> Result<String> {
    let stdin = io::stdin();
    if !from_stdin && stdin.is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

/// Parse `key=value`. The value is taken as JSON when it parses, else as a
/// string; an empty value means "remove".
fn parse_attr(raw: &str) -> Result<(String, Option<Value>)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("attribute '{raw}' is not KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("attribute '{raw}' has an empty key");
    }
    if matches!(key, "username" | "password" | "password_hash") {
        bail!("'{key}' cannot be set as an attribute");
    }
    if value.is_empty() {
        return Ok((key.to_string(), None));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), Some(value)))
}
