mod export;
mod exporter;
mod output;
mod utils;
mod watch;

use clap::{Parser, Subcommand};
use eyre::{Context, Result, eyre};
use imsg_history::MessageStore;
use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use utils::Enrichment;

const DEFAULT_CHAT_LIMIT: usize = 20;
const DEFAULT_MESSAGE_LIMIT: usize = 50;
const WATCH_BATCH_SIZE: usize = 100;

/// Read chats and messages from the macOS Messages database.
/// The database is opened read-only; nothing is ever written to it.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to chat.db.
    /// Defaults to ~/Library/Messages/chat.db if not set in config.
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/imsg-history/config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Emit one JSON object per line.
    #[arg(long, global = true)]
    json: bool,

    /// Read from a temporary copy of the database instead of the live file.
    #[arg(long, global = true)]
    snapshot: bool,

    /// Debug logging on stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recent chats, newest first.
    Chats {
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Show messages for one chat, newest first.
    History {
        #[arg(long, value_name = "ID")]
        chat_id: i64,
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Include attachment metadata.
        #[arg(long)]
        attachments: bool,
        /// Include tapbacks.
        #[arg(long)]
        reactions: bool,
    },
    /// Print new messages as they arrive.
    Watch {
        #[arg(long, value_name = "ID")]
        chat_id: Option<i64>,
        /// Start after this row id instead of the newest message.
        #[arg(long = "since-rowid", value_name = "ROWID")]
        since_rowid: Option<i64>,
        #[arg(long, value_name = "MS", default_value_t = 250)]
        interval_ms: u64,
        #[arg(long)]
        attachments: bool,
        #[arg(long)]
        reactions: bool,
    },
    /// Export every chat to a Markdown file.
    Export {
        #[arg(value_name = "TARGET_DIR")]
        target_dir: PathBuf,
        /// Number of chats to export.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Most recent messages per chat.
        #[arg(long, value_name = "N", default_value_t = 10_000)]
        messages: usize,
        /// Suppress the progress bar and summary.
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    limit: Option<usize>,
    attachments: Option<bool>,
    reactions: Option<bool>,
}

impl FileConfig {
    /// A flag given on the command line wins; otherwise the config value, else off.
    fn enrichment(&self, attachments: bool, reactions: bool) -> Enrichment {
        Enrichment {
            attachments: attachments || self.attachments.unwrap_or(false),
            reactions: reactions || self.reactions.unwrap_or(false),
        }
    }
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("imsg-history/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file_cfg = load_file_config(cli.config.as_deref())?;

    // CLI > Config > Default
    let db_path = cli
        .db
        .clone()
        .or_else(|| file_cfg.db_path.clone())
        .or_else(MessageStore::default_path)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    let store = utils::open_store(&db_path, cli.snapshot)?;

    match cli.command {
        Command::Chats { limit } => {
            let limit = limit.or(file_cfg.limit).unwrap_or(DEFAULT_CHAT_LIMIT);
            let chats = store.list_chats(limit).wrap_err("Failed to list chats")?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for chat in &chats {
                output::write_chat(&mut out, chat, cli.json)?;
            }
            out.flush()?;
        }
        Command::History {
            chat_id,
            limit,
            attachments,
            reactions,
        } => {
            let limit = limit.or(file_cfg.limit).unwrap_or(DEFAULT_MESSAGE_LIMIT);
            let enrich = file_cfg.enrichment(attachments, reactions);
            let messages = store
                .messages(chat_id, limit)
                .wrap_err_with(|| format!("Failed to load messages for chat {}", chat_id))?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for message in &messages {
                let (attachments, reactions) = utils::load_details(&store, message, enrich)?;
                output::write_message(&mut out, message, &attachments, &reactions, cli.json)?;
            }
            out.flush()?;
        }
        Command::Watch {
            chat_id,
            since_rowid,
            interval_ms,
            attachments,
            reactions,
        } => {
            let config = watch::WatchConfig {
                chat_id,
                since_row_id: since_rowid,
                interval: Duration::from_millis(interval_ms.max(1)),
                batch_size: WATCH_BATCH_SIZE,
                enrich: file_cfg.enrichment(attachments, reactions),
                json: cli.json,
            };
            watch::execute(&store, &config)?;
        }
        Command::Export {
            target_dir,
            limit,
            messages,
            quiet,
        } => {
            let config = export::ExportConfig {
                target_dir: imsg_history::attachments::expand_tilde(
                    &target_dir,
                    dirs::home_dir().as_deref(),
                ),
                chat_limit: limit.or(file_cfg.limit).unwrap_or(usize::MAX),
                message_limit: messages,
                quiet,
                verbose: cli.verbose,
            };
            export::execute(&store, &config)?;
        }
    }

    Ok(())
}
