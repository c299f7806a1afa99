pub mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::chat::{
    ChatError, ChatSession, HttpAnswerProvider, Message, ProviderReply, SessionObserver,
    SessionOptions,
};
use crate::cli::commands::{Commands, FileAction};
use crate::config::AppConfig;
use crate::db::get_connection;
use crate::storage::{FileStore, StorageError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database Error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;

    match command {
        Commands::Serve => {
            warn!("Serve is started by the binary entry point, not run_cli");
            Ok(())
        }
        Commands::Files { action } => run_files(action, &config),
        Commands::Chat { session, endpoint } => {
            let endpoint = endpoint.unwrap_or_else(|| config.chat.endpoint.clone());
            run_repl(session, endpoint, &config).await
        }
    }
}

fn run_files(action: FileAction, config: &AppConfig) -> Result<(), CliError> {
    let pool = get_connection(&config.database)?;
    let store = FileStore::open(&config.storage, pool)?;

    match action {
        FileAction::List { limit } => {
            let files = store.list(limit, 0)?;
            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<50} | {:>10} | {:<20} | {}", "Key", "Size", "Uploaded At", "Name");
                println!("{:-<50}-+-{:->10}-+-{:-<20}-+-{:-<20}", "", "", "", "");
                for f in files {
                    println!(
                        "{:<50} | {:>10} | {:<20} | {}",
                        f.key,
                        f.size,
                        f.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                        f.pathname
                    );
                }
            }
        }
        FileAction::Upload { path, content_type } => {
            let data = std::fs::read(&path)?;
            let record = store.put(&path, content_type.as_deref(), &data)?;
            println!("Uploaded {} as {}", record.pathname, record.key);
        }
        FileAction::Delete { key } => {
            if store.delete(&key)? {
                println!("Deleted file {}", key);
            } else {
                eprintln!("File {} not found.", key);
            }
        }
    }
    Ok(())
}

/// Prints replies and failures as the session reports them.
struct TerminalObserver;

impl SessionObserver for TerminalObserver {
    fn on_response(&self, reply: &ProviderReply) {
        if !reply.is_success() {
            eprintln!("Relay answered with status {}", reply.status);
        }
    }

    fn on_finish(&self, message: &Message) {
        println!("Assistant> {}", message.content);
    }

    fn on_error(&self, error: &ChatError) {
        match error {
            ChatError::Cancelled => {}
            other => eprintln!("Error: {}", other),
        }
    }
}

async fn run_repl(
    session_id: Option<String>,
    endpoint: String,
    config: &AppConfig,
) -> Result<(), CliError> {
    let mut options = SessionOptions::from(&config.chat);
    if let Some(id) = session_id {
        options = options.with_id(id);
    }
    let provider = Arc::new(HttpAnswerProvider::new(endpoint));
    println!("--- ragchat terminal ---");
    println!("Relay: {}", provider.endpoint());

    let session = ChatSession::new(provider, options).with_observer(Arc::new(TerminalObserver));

    println!("Session: {}", session.id());
    println!("Ctrl-C stops a pending answer. /reset clears the chat, /exit quits.");
    println!("------------------------");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nUser> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                session.reset();
                println!("Chat cleared.");
                continue;
            }
            "/history" => {
                for m in session.messages() {
                    println!("[{}]: {}", m.role.as_str().to_uppercase(), m.content);
                }
                continue;
            }
            _ => {}
        }

        session.set_draft(line);
        let pending = match session.handle_submit() {
            Ok(Some(pending)) => pending,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };

        tokio::select! {
            _ = pending.settled() => {}
            _ = tokio::signal::ctrl_c() => {
                session.stop();
                println!("\n(stopped)");
            }
        }
    }

    Ok(())
}
