use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    terminate_all_and_reload, Authorizations, EntryList, HttpRpcSender, RegistryConfig,
    SessionsView, ShortPoller,
};
use futures::StreamExt;
use shared::{
    domain::{ApiId, SessionHash},
    protocol::SignInRequest,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod render;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "sessions", about = "Inspect and manage the sessions of an account")]
struct Cli {
    #[arg(long, env = "SESSIONS_SERVER_URL", default_value = "http://127.0.0.1:8443")]
    server_url: String,
    /// Key printed by `sign-in`.
    #[arg(long, env = "SESSIONS_AUTH_KEY")]
    auth_key: Option<String>,
    /// Name shown for this device instead of the one the server reports.
    #[arg(long, env = "SESSIONS_DEVICE_MODEL")]
    device_model: Option<String>,
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a new session and prints its auth key.
    SignIn(SignInArgs),
    #[command(flatten)]
    Session(SessionCommand),
}

#[derive(Args, Debug)]
struct SignInArgs {
    username: String,
    #[arg(long, default_value_t = 2040)]
    api_id: i32,
    #[arg(long, default_value = "sessions")]
    app_name: String,
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,
    #[arg(long, default_value = "cli")]
    device_model: String,
    #[arg(long, default_value = std::env::consts::OS)]
    platform: String,
    #[arg(long, default_value = "")]
    system_version: String,
    #[arg(long)]
    password_pending: bool,
}

/// Commands that act through an existing session.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    List,
    Terminate {
        #[arg(value_parser = parse_hash)]
        hash: SessionHash,
    },
    TerminateAll,
    /// Shows the auto-termination period, or changes it when `days` is given.
    Ttl { days: Option<i32> },
    /// Allows or blocks incoming calls on a session, this one by default.
    Calls {
        state: CallsState,
        #[arg(long, value_parser = parse_hash)]
        hash: Option<SessionHash>,
    },
    /// Keeps the list fresh and prints it on every change until interrupted.
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum CallsState {
    On,
    Off,
}

fn parse_hash(raw: &str) -> Result<SessionHash, String> {
    u64::from_str_radix(raw.trim().trim_start_matches("0x"), 16)
        .map(SessionHash)
        .map_err(|e| format!("expected a hex session hash: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let command = match cli.command {
        Command::SignIn(args) => return sign_in(&cli.server_url, args).await,
        Command::Session(command) => command,
    };

    let auth_key = cli
        .auth_key
        .context("--auth-key (or SESSIONS_AUTH_KEY) is required; run `sign-in` first")?;
    let sender = HttpRpcSender::new(&cli.server_url, auth_key)?;
    let mut config = RegistryConfig::default().with_utc_offset_minutes(cli.utc_offset_minutes);
    if let Some(model) = cli.device_model {
        config = config.with_device_model(model);
    }
    let registry = Authorizations::new(Arc::new(sender), config);

    match command {
        SessionCommand::List => {
            let list = load(&registry).await?;
            print!("{}", render::render_view(SessionsView::from_list(&list).as_ref()));
        }
        SessionCommand::Terminate { hash } => {
            let list = load(&registry).await?;
            let mut view = SessionsView::from_list(&list);
            let confirmed = registry.request_terminate(Some(hash)).await?;
            print!("{}", render::render_termination(Some(hash), confirmed));
            if confirmed {
                if let Some(view) = view.as_mut() {
                    view.remove(hash);
                }
                print!("{}", render::render_view(view.as_ref()));
            }
        }
        SessionCommand::TerminateAll => {
            let before = registry.last_received_time();
            let confirmed = terminate_all_and_reload(&registry).await?;
            let list = wait_for_reload(&registry, before).await?;
            print!("{}", render::render_termination(None, confirmed));
            print!("{}", render::render_view(SessionsView::from_list(&list).as_ref()));
        }
        SessionCommand::Ttl { days: None } => {
            load(&registry).await?;
            println!("sessions end after {} days of inactivity", registry.ttl_days());
        }
        SessionCommand::Ttl { days: Some(days) } => {
            if registry.update_ttl(days).await? {
                println!("sessions now end after {days} days of inactivity");
            } else {
                bail!("server did not accept a ttl of {days} days");
            }
        }
        SessionCommand::Calls { state, hash } => {
            let disabled = matches!(state, CallsState::Off);
            let hash = hash.unwrap_or(SessionHash::CURRENT);
            if registry.toggle_calls_disabled(hash, disabled).await? {
                println!("calls {} for {hash}", if disabled { "blocked" } else { "allowed" });
            } else {
                bail!("server did not change call settings for {hash}");
            }
        }
        SessionCommand::Watch => watch(&registry).await?,
    }
    Ok(())
}

async fn sign_in(server_url: &str, args: SignInArgs) -> Result<()> {
    let request = SignInRequest {
        username: args.username,
        api_id: ApiId(args.api_id),
        app_name: args.app_name,
        app_version: args.app_version,
        device_model: args.device_model,
        platform: args.platform,
        system_version: args.system_version,
        password_pending: args.password_pending,
        ..SignInRequest::default()
    };
    let response = HttpRpcSender::sign_in(server_url, &request).await?;
    println!("hash={}", response.hash);
    println!("auth_key={}", response.auth_key);
    Ok(())
}

/// Reloads and waits for the outcome; a failed reload surfaces as an error
/// here since the registry only logs it.
async fn load(registry: &Arc<Authorizations>) -> Result<EntryList> {
    let before = registry.last_received_time();
    registry.reload();
    wait_for_reload(registry, before).await
}

async fn wait_for_reload(
    registry: &Arc<Authorizations>,
    before: Option<std::time::Instant>,
) -> Result<EntryList> {
    let settled = async {
        while registry.is_loading() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
    tokio::time::timeout(REQUEST_TIMEOUT, settled)
        .await
        .context("timed out waiting for the session list")?;
    if registry.last_received_time() == before {
        bail!("could not load the session list");
    }
    Ok(registry.list())
}

async fn watch(registry: &Arc<Authorizations>) -> Result<()> {
    let poller = ShortPoller::with_registry_period(Arc::clone(registry));
    let mut changes = Box::pin(registry.list_changes().skip(1));
    info!(
        period_secs = registry.config().short_poll_period.as_secs(),
        "watching sessions"
    );
    loop {
        tokio::select! {
            next = changes.next() => {
                let Some(list) = next else { break };
                println!("{}", render::render_view(SessionsView::from_list(&list).as_ref()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    poller.stop();
    Ok(())
}
