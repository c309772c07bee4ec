mod config;
mod error;
mod interrupt;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artsy::ArtsyClient;
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use runtime::{
    BackendModerator, CommandClassifier, GuardedBackend, OpenAiBackend, PaintingStyle,
    RespondContext, Session, StyleClassifier, ToolRegistry,
};
use storage::{Event, EventKind, EventStore, Role};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use interrupt::Interrupts;

const DEFAULT_LOG_FILTER: &str = "musezen=info,runtime=info,artsy=info";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const MAX_LOG_CONTENT: usize = 200;

type CuratorBackend = GuardedBackend<OpenAiBackend>;

#[derive(Parser)]
#[command(name = "musezen")]
#[command(about = "Chat with an AI art curator", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./musezen.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to chat with, overriding the config file
    #[arg(long, value_enum, global = true)]
    model: Option<ModelChoice>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelChoice {
    #[value(name = "gpt-4o-mini")]
    Gpt4oMini,
    #[value(name = "gpt-4o")]
    Gpt4o,
}

impl ModelChoice {
    fn as_str(self) -> &'static str {
        match self {
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4o => "gpt-4o",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List all sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show event logs for a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (message, tool_call, tool_result, session_start, session_end)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq)]
enum ReplCommand<'a> {
    Empty,
    Quit,
    Clear,
    Upload(&'a Path),
    Style(&'a str),
    Help,
    Chat(&'a str),
}

impl<'a> ReplCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let input = line.trim();
        if input.is_empty() {
            return Self::Empty;
        }
        if input == "quit" || input == "exit" {
            return Self::Quit;
        }
        let Some(command) = input.strip_prefix('/') else {
            return Self::Chat(input);
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map(|(name, arg)| (name, arg.trim()))
            .unwrap_or((command, ""));
        match name {
            "clear" => Self::Clear,
            "upload" if !arg.is_empty() => Self::Upload(Path::new(arg)),
            "style" if !arg.is_empty() => Self::Style(arg),
            _ => Self::Help,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Chat) | None => {
            let mut config = Config::discover(cli.config.as_deref())?;
            if let Some(model) = cli.model {
                config.backend.model = model.as_str().to_string();
            }
            cmd_chat(config).await
        }
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&session, kind.as_deref()),
    }
}

async fn cmd_chat(config: Config) -> Result<()> {
    println!("musezen v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(chat_backend(&config)?);
    let tools = Arc::new(curator_tools(&config).await?);
    let classifier = config.classifier();

    let data_dir = dirs_data_dir().unwrap_or_else(|| ".musezen".into());
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("events.db");
    let store = EventStore::open(&db_path)?;

    println!("Session stored at: {}", db_path.display());

    let mut session = Session::new(
        store,
        backend.clone(),
        tools.clone(),
        config.session_options(),
    )?;
    println!("Session ID: {}", session.id());
    println!("Model: {backend}");
    println!("Tools: {}", describe_tools(&tools));
    println!("Commands: /upload <image>, /style <label>, /clear");
    println!("Type 'quit' or Ctrl+D to exit. Ctrl+C interrupts an answer, or exits when idle.\n");
    println!("{}\n", session.welcome_message());

    let interrupts = Interrupts::new();
    interrupts.watch();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => {
                eprintln!("Commands: /upload <image>, /style <label>, /clear, quit\n");
            }
            ReplCommand::Clear => {
                session.reset()?;
                println!("\nConversation cleared.\n\n{}\n", session.welcome_message());
            }
            ReplCommand::Upload(path) => {
                match interrupts.run(classify_upload(classifier.as_ref(), path)).await {
                    Some(Ok(style)) => {
                        session.attach_style(style);
                        println!("\nDetected style: {style}. Ask me anything about it.\n");
                    }
                    Some(Err(e)) => eprintln!("Error: {e}\n"),
                    None => eprintln!("\nUpload cancelled.\n"),
                }
            }
            ReplCommand::Style(label) => match label.parse::<PaintingStyle>() {
                Ok(style) => {
                    session.attach_style(style);
                    println!("\nStyle set to {style} for your next message.\n");
                }
                Err(e) => eprintln!("Error: {e}\n"),
            },
            ReplCommand::Chat(input) => {
                match chat_interruptible(&mut session, &interrupts, input).await {
                    Ok(response) => println!("\n{response}\n"),
                    Err(e) => eprintln!("\n{}\n", e.user_message()),
                }
            }
        }
    }

    session.end()?;
    println!("\nSession ended.");
    Ok(())
}

/// Art database tools, or an empty registry when no credentials are configured.
async fn curator_tools(config: &Config) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    match config.artsy_credentials() {
        Some((client_id, client_secret)) => {
            let client = ArtsyClient::connect(&client_id, &client_secret).await?;
            artsy::register_curator_tools(&mut registry, Arc::new(client))
                .map_err(runtime::Error::from)?;
            info!(tools = registry.len(), "art database tools registered");
        }
        None => warn!("no art database credentials configured, chatting without tools"),
    }
    Ok(registry)
}

fn describe_tools(tools: &ToolRegistry) -> String {
    if tools.is_empty() {
        return "none (set ARTSY_CLIENT_ID and ARTSY_CLIENT_SECRET)".to_string();
    }
    tools
        .specs()
        .iter()
        .map(|spec| spec.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The chat model, behind the configured prompt budget and moderator.
fn chat_backend(config: &Config) -> Result<CuratorBackend> {
    let api_key = config.api_key()?;
    let mut builder = OpenAiBackend::builder(api_key.clone(), &config.backend.model)
        .base_url(&config.backend.base_url);
    if let Some(max_tokens) = config.backend.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    let mut backend = GuardedBackend::new(builder.build());
    if let Some(limit) = config.guard.max_prompt_tokens {
        backend = backend.max_prompt_tokens(limit);
    }
    if let Some((model, base_url)) = config.moderation() {
        let guard = OpenAiBackend::builder(api_key, model).base_url(base_url).build();
        backend = backend.moderator(Arc::new(BackendModerator::new(guard)));
        info!(model, "reply moderation enabled");
    }
    Ok(backend)
}

/// Run one chat turn; Ctrl+C cancels it without leaving the REPL.
async fn chat_interruptible(
    session: &mut Session<CuratorBackend>,
    interrupts: &Interrupts,
    input: &str,
) -> runtime::Result<String> {
    let cancel = interrupts.begin();
    let result = session
        .chat_with(input, &RespondContext::new(cancel))
        .await;
    interrupts.finish();
    result
}

async fn classify_upload(
    classifier: Option<&CommandClassifier>,
    path: &Path,
) -> Result<PaintingStyle> {
    check_image_path(path)?;
    let classifier = classifier.ok_or(Error::NoClassifier)?;
    let image = tokio::fs::read(path).await?;
    info!(path = %path.display(), bytes = image.len(), "classifying upload");
    Ok(classifier.classify(&image).await?)
}

fn check_image_path(path: &Path) -> Result<()> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|ok| ext.eq_ignore_ascii_case(ok)));
    if supported {
        Ok(())
    } else {
        Err(Error::UnsupportedImage {
            path: path.to_path_buf(),
        })
    }
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<8}  STATUS",
        "SESSION ID", "STARTED", "MSGS"
    );
    println!("{}", "-".repeat(80));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "ended"
        } else {
            "active"
        };
        println!(
            "{:<36}  {:<20}  {:<8}  {status}",
            summary.id, started, summary.message_count
        );
    }

    Ok(())
}

fn cmd_logs(session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;

    let sessions = store.list_sessions()?;
    let matching: Vec<_> = sessions
        .iter()
        .filter(|s| s.id.to_string().starts_with(session_prefix))
        .collect();

    let session_id = match matching.as_slice() {
        [] => {
            return Err(Error::SessionNotFound {
                prefix: session_prefix.to_string(),
            });
        }
        [only] => only.id,
        _ => {
            return Err(Error::AmbiguousSession {
                prefix: session_prefix.to_string(),
                matches: matching.iter().map(|s| s.id.to_string()).collect(),
            });
        }
    };

    let events = store.load_events(session_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart => {
            println!("[{time}] === Session started ===");
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Message { role, content } => {
            let role_str = match role {
                Role::User => "USER",
                Role::Assistant => "CURATOR",
                Role::System => "SYSTEM",
                Role::Tool => "TOOL",
            };
            println!("[{time}] {role_str}: {}", truncate(content, MAX_LOG_CONTENT));
        }
        EventKind::ToolCall {
            call_id,
            name,
            arguments,
        } => {
            println!("[{time}] TOOL CALL {call_id}: {name} {arguments}");
        }
        EventKind::ToolResult {
            call_id,
            name,
            output,
            is_error,
        } => {
            let label = if *is_error { "TOOL ERROR" } else { "TOOL RESULT" };
            println!(
                "[{time}] {label} {call_id}: {name} {}",
                truncate(output, MAX_LOG_CONTENT)
            );
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn open_store() -> Result<EventStore> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".musezen".into());
    let db_path = data_dir.join("events.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/musezen"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("musezen"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("musezen"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
