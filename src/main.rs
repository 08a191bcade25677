//! # Groundcrew CLI (`crew`)
//!
//! The `crew` binary drives the knowledge-base pipeline and the chat
//! surface from the command line.
//!
//! ## Usage
//!
//! ```bash
//! crew --config ./config/crew.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crew process` | Ingest PDFs, embed chunks, build the vector index |
//! | `crew ask "<question>"` | Answer a question from the knowledge base |
//! | `crew chat list` | List saved conversations |
//! | `crew chat show <name>` | Print a saved conversation |
//! | `crew chat delete <name>` | Delete a saved conversation |
//! | `crew status` | Knowledge base / index / conversation health |
//! | `crew serve` | Start the JSON HTTP API |
//!
//! The Gemini API key is supplied per invocation with `--api-key` or the
//! `GEMINI_API_KEY` environment variable; it is never written to disk.

mod chat;
mod chunk;
mod config;
mod embedding;
mod index;
mod loader;
mod models;
mod server;
mod session;
mod status;
mod synthesize;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::chat::ChatStore;
use crate::models::ChatSession;
use crate::session::ProcessOutcome;

/// Groundcrew — a document-grounded question answering chat service for
/// PDF knowledge bases.
#[derive(Parser)]
#[command(
    name = "crew",
    about = "Groundcrew — document-grounded question answering over a PDF knowledge base",
    version,
    long_about = "Groundcrew ingests a directory of PDF documents into a vector index and \
    answers questions by retrieving the most relevant passages and generating an answer \
    grounded in them. Conversations can be saved per owner and resumed later."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crew.toml")]
    config: PathBuf,

    /// Gemini API key. Falls back to the GEMINI_API_KEY environment
    /// variable. Required for `process` and `ask`.
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the knowledge base and build the vector index.
    ///
    /// Extracts text from every PDF under the configured root, chunks it,
    /// embeds the chunks, and atomically replaces the index artifact. An
    /// empty or unreadable knowledge base is a warning, not an error, and
    /// leaves any existing index untouched.
    Process {
        /// Show document and chunk counts without embedding or writing
        /// anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question against the indexed knowledge base.
    ///
    /// Requires a built index; run `crew process` first. With `--chat`,
    /// the exchange is appended to the named saved conversation (created
    /// on first use).
    Ask {
        /// The question to answer.
        question: String,

        /// Append the exchange to this saved conversation.
        #[arg(long)]
        chat: Option<String>,

        /// Conversation owner namespace.
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Manage saved conversations.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Show knowledge base, index, and conversation status.
    Status {
        /// Conversation owner namespace.
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Start the JSON HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// endpoints a chat UI calls.
    Serve,
}

/// Saved-conversation subcommands.
#[derive(Subcommand)]
enum ChatAction {
    /// List saved conversations.
    List {
        /// Conversation owner namespace.
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// Print a saved conversation.
    Show {
        /// Conversation name.
        name: String,
        /// Conversation owner namespace.
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// Delete a saved conversation.
    Delete {
        /// Conversation name.
        name: String,
        /// Conversation owner namespace.
        #[arg(long, default_value = "local")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Process { dry_run } => {
            if dry_run {
                run_process_dry_run(&cfg)?;
            } else {
                let api_key = resolve_api_key(cli.api_key)?;
                run_process(&cfg, &api_key).await?;
            }
        }
        Commands::Ask {
            question,
            chat,
            owner,
        } => {
            let api_key = resolve_api_key(cli.api_key)?;
            run_ask(&cfg, &api_key, &question, chat, &owner).await?;
        }
        Commands::Chat { action } => {
            let store = ChatStore::new(&cfg.conversations.root);
            match action {
                ChatAction::List { owner } => {
                    let names = store.list(&owner)?;
                    if names.is_empty() {
                        println!("No saved conversations.");
                    } else {
                        for name in names {
                            println!("{}", name);
                        }
                    }
                }
                ChatAction::Show { name, owner } => {
                    let messages = store.load(&owner, &name)?;
                    for msg in messages {
                        println!("{}: {}", msg.role, msg.content);
                    }
                }
                ChatAction::Delete { name, owner } => {
                    store.delete(&owner, &name)?;
                    println!("Deleted conversation '{}'.", name);
                }
            }
        }
        Commands::Status { owner } => {
            status::run_status(&cfg, &owner).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn resolve_api_key(flag: Option<String>) -> Result<String> {
    if let Some(key) = flag.filter(|k| !k.is_empty()) {
        return Ok(key);
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }
    anyhow::bail!("Gemini API key required: pass --api-key or set GEMINI_API_KEY")
}

fn run_process_dry_run(cfg: &config::Config) -> Result<()> {
    let summary = loader::load_knowledge_base(&cfg.knowledge_base)?;
    let chunks = chunk::chunk_text(
        &summary.text,
        cfg.chunking.chunk_size,
        cfg.chunking.overlap,
    );

    println!("process (dry-run)");
    println!("  documents readable: {}", summary.documents);
    println!("  documents skipped: {}", summary.skipped);
    println!("  extracted characters: {}", summary.text.len());
    println!("  estimated chunks: {}", chunks.len());
    Ok(())
}

async fn run_process(cfg: &config::Config, api_key: &str) -> Result<()> {
    println!("Processing knowledge base...");
    match session::process_knowledge_base(cfg, api_key).await? {
        ProcessOutcome::NoDocuments => {
            println!(
                "Warning: No PDF files found in {}. Nothing to index.",
                cfg.knowledge_base.root.display()
            );
        }
        ProcessOutcome::NoText => {
            println!("Warning: Could not extract text from the PDF files. Nothing to index.");
        }
        ProcessOutcome::Indexed {
            documents,
            chunks,
            skipped,
        } => {
            println!("Knowledge base indexed successfully.");
            println!("  documents: {}", documents);
            println!("  chunks: {}", chunks);
            if skipped > 0 {
                println!("  skipped (unreadable): {}", skipped);
            }
        }
    }
    Ok(())
}

async fn run_ask(
    cfg: &config::Config,
    api_key: &str,
    question: &str,
    chat: Option<String>,
    owner: &str,
) -> Result<()> {
    let store = ChatStore::new(&cfg.conversations.root);

    let mut session_ctx = match &chat {
        Some(name) => match session::load_conversation(&store, owner, name) {
            Ok(loaded) => loaded,
            Err(chat::ChatError::NotFound { .. }) => ChatSession {
                messages: Vec::new(),
                current_chat_name: Some(name.clone()),
            },
            Err(e) => return Err(e.into()),
        },
        None => ChatSession::default(),
    };

    let reply = session::ask(cfg, &store, &mut session_ctx, owner, api_key, question).await?;
    println!("{}", reply);
    Ok(())
}
