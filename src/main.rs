//! # kb-chat CLI (`kbchat`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbchat init` | Create the SQLite database and run schema migrations |
//! | `kbchat serve` | Start the HTTP server |
//! | `kbchat match "<query>"` | Show which knowledge entry a question retrieves |
//! | `kbchat conversations` | List stored conversations |
//!
//! ## Examples
//!
//! ```bash
//! kbchat init --config ./config/kbchat.toml
//! kbchat match "what is unasat" --explain
//! RUST_LOG=kb_chat=debug kbchat serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kb_chat::config;
use kb_chat::sqlite_store::SqliteStore;
use kb_chat::{db, knowledge, migrate, server};
use kb_chat_core::scorer::{find_best_match, score_entries};
use kb_chat_core::store::ConversationStore;

/// kb-chat: a knowledge-grounded chat backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbchat",
    about = "kb-chat: a knowledge-grounded chat backend with streaming answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbchat.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Run retrieval for a question against the configured dataset.
    Match {
        /// The question to match.
        query: String,

        /// Print every entry's scoring signals.
        #[arg(long)]
        explain: bool,
    },

    /// List stored conversations, most recently updated first.
    Conversations,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "kb_chat=debug,tower_http=debug"
    } else {
        "kb_chat=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Match { query, explain } => {
            let index = knowledge::read_index(&cfg.knowledge.path)?;
            let policy = cfg.retrieval.policy();

            if explain {
                for (entry, s) in score_entries(&index, &query) {
                    println!(
                        "{:<12} score={:.3} direct={:.0} contain={:.2} overlap={:.3} ({})  {}",
                        entry.id,
                        s.score,
                        s.direct_question_match,
                        s.containment_match,
                        s.overlap_ratio,
                        s.overlap_count,
                        entry.question
                    );
                }
                println!();
            }

            match find_best_match(&index, &query, &policy) {
                Some(m) => {
                    println!(
                        "Matched entry {} (score {:.3}, overlap {})",
                        m.entry.id, m.score, m.overlap_count
                    );
                    println!("Q: {}", m.entry.question);
                    println!("A: {}", m.entry.answer);
                }
                None => println!("No knowledge entry matched."),
            }
        }
        Commands::Conversations => {
            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;
            let store: Arc<dyn ConversationStore> = Arc::new(SqliteStore::new(pool));
            let conversations = store.list_conversations().await?;

            if conversations.is_empty() {
                println!("No conversations.");
            }
            for conv in conversations {
                let count = store.count_messages(&conv.id).await?;
                println!(
                    "{}  {}  {:>3} messages  {}",
                    conv.id,
                    conv.updated_at.format("%Y-%m-%d %H:%M"),
                    count,
                    conv.title
                );
            }
        }
    }

    Ok(())
}
