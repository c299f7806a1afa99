use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ragchat", version, about = "RAG gateway chat relay and file manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Chat with the gateway from the terminal through the relay route
    Chat {
        /// Reuse a session id instead of generating one
        #[arg(short, long)]
        session: Option<String>,

        /// Relay endpoint (defaults to chat.endpoint from the config)
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Manage uploaded files
    Files {
        #[command(subcommand)]
        action: FileAction,
    },
}

#[derive(Subcommand)]
pub enum FileAction {
    /// List stored files, newest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Store a local file
    Upload {
        /// Path of the file to upload
        path: String,

        /// Content type to record
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Delete a stored file by key
    Delete { key: String },
}
