use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use taskmate::client::{ApiClient, Reply, Session, SessionFile};
use taskmate::config::{ClientConfig, ServerConfig};
use taskmate::kanban_board::{KanbanBoard, StatusFilter};
use taskmate::server;
use taskmate::task::TaskStatus;
use taskmate::ui;

const DEFAULT_FILTER: &str = "taskmate=debug,tower_http=debug";

#[derive(Parser)]
#[command(name = "taskmate", version, about = "Personal task tracker: API server and terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Overrides HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create an account and store its session
    Register {
        #[arg(long)]
        username: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Log in and store the session
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Forget the stored session
    Logout,
    /// Print your tasks, newest first
    List {
        /// pending, working or done
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Case-insensitive match on title or description
        #[arg(long)]
        search: Option<String>,
    },
    /// Open the interactive dashboard
    Board,
}

#[derive(Args)]
struct Credentials {
    #[arg(long)]
    email: String,
    #[arg(long, env = "TASKMATE_PASSWORD", hide_env_values = true)]
    password: String,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    match cli.command {
        Command::Serve { host, port } => {
            init_server_logging();
            let mut config = ServerConfig::from_env()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            runtime.block_on(server::serve(config))
        }
        command => {
            let config = ClientConfig::from_env()?;
            init_client_logging(&config)?;
            run_client(&runtime, &config, command)
        }
    }
}

fn init_server_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// The dashboard owns the terminal, so client logs go to a file.
fn init_client_logging(config: &ClientConfig) -> anyhow::Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "taskmate=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

fn run_client(
    runtime: &tokio::runtime::Runtime,
    config: &ClientConfig,
    command: Command,
) -> anyhow::Result<()> {
    let sessions = SessionFile::new(&config.session_path);
    let client = ApiClient::new(&config.api_url);

    match command {
        Command::Register {
            username,
            credentials,
        } => {
            let reply = runtime.block_on(client.register(
                &username,
                &credentials.email,
                &credentials.password,
            ))?;
            store_session(&sessions, reply)
        }
        Command::Login { credentials } => {
            let reply =
                runtime.block_on(client.login(&credentials.email, &credentials.password))?;
            store_session(&sessions, reply)
        }
        Command::Logout => {
            sessions.clear()?;
            println!("Logged out. See you next time!");
            Ok(())
        }
        Command::List { status, search } => {
            let session = require_session(&sessions)?;
            let client = client.with_token(session.token);
            let tasks = match runtime.block_on(client.fetch_tasks())? {
                Reply::Data(tasks) => tasks,
                Reply::Message(message) => bail!(message),
            };

            let mut board = KanbanBoard::new();
            board.replace_all(tasks);
            board.filter = status.map_or(StatusFilter::All, StatusFilter::Only);
            board.set_query(search.unwrap_or_default());

            let today = Local::now().date_naive();
            for task in board.visible() {
                let state = if task.is_overdue(today) {
                    "overdue".to_string()
                } else {
                    task.status.to_string()
                };
                let due = task
                    .deadline
                    .map(|d| format!(" (Due: {d})"))
                    .unwrap_or_default();
                println!("[{}] {:<8} {}{}", task.id, state, task.title, due);
            }
            Ok(())
        }
        Command::Board => {
            let session = require_session(&sessions)?;
            let client = client.with_token(session.token);
            ui::run_board(runtime, client, &session.user.username)?;
            Ok(())
        }
        Command::Serve { .. } => bail!("`serve` is not a client command"),
    }
}

fn store_session(
    sessions: &SessionFile,
    reply: Reply<taskmate::auth::AuthResponse>,
) -> anyhow::Result<()> {
    match reply {
        Reply::Data(response) => {
            let session = Session::from(response);
            sessions.save(&session)?;
            tracing::info!(user = %session.user.id, "session stored");
            println!("Welcome, {}!", session.user.username);
            Ok(())
        }
        Reply::Message(message) => bail!(message),
    }
}

fn require_session(sessions: &SessionFile) -> anyhow::Result<Session> {
    sessions
        .load()?
        .with_context(|| "not logged in; run `taskmate login` first".to_string())
}
