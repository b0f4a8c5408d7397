mod config;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use tapback_bridge::{
    Bridge, BridgeConfig, ContactIndex, JsonContactStore, NameResolver, NoContacts, Osascript,
};
use tapback_types::{ChatSummary, DecodedMessage};

use crate::config::Config;

type CliBridge = Bridge<Box<dyn NameResolver>, Osascript>;

#[derive(Parser)]
#[command(name = "tapback")]
#[command(
    about = "Read and send iMessages through a snapshot of the Messages store",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the most recently active chats
    Chats {
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show the last messages of one chat
    Messages {
        chat_id: i64,
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Show the newest messages across all chats
    Recent {
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Send to a single phone number or email
    Send { recipient: String, text: String },

    /// Send into a chat, routed by its participants
    SendChat { chat_id: i64, text: String },

    /// Write the latest conversations as JSON lines
    Export {
        /// Number of most recently active chats
        #[arg(long, default_value = "5")]
        chats: u32,
        /// Messages per chat
        #[arg(long, default_value = "100")]
        per_chat: u32,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Poll the store and reprint the chat list whenever it changes
    Watch {
        /// Seconds between polls
        #[arg(long, default_value = "5")]
        interval: u64,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

/// One exported message.
#[derive(Serialize)]
struct ExportRecord<'a> {
    chat_id: i64,
    sender_label: String,
    #[serde(flatten)]
    message: &'a DecodedMessage,
}

fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tapback=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut bridge = open_bridge(&config)?;

    match cli.command {
        Commands::Chats { limit } => print_chats(&bridge.recent_chats(limit)?),
        Commands::Messages { chat_id, limit } => {
            let messages = bridge.messages_in_chat(chat_id, limit)?;
            print_messages(&bridge, &messages);
        }
        Commands::Recent { limit } => {
            let messages = bridge.recent_messages(limit)?;
            print_messages(&bridge, &messages);
        }
        Commands::Send { recipient, text } => bridge.send_to_recipient(&recipient, &text)?,
        Commands::SendChat { chat_id, text } => bridge.send_to_chat(chat_id, &text)?,
        Commands::Export { chats, per_chat, out } => export(&mut bridge, chats, per_chat, &out)?,
        Commands::Watch { interval, limit } => {
            watch(&mut bridge, Duration::from_secs(interval), limit)?
        }
    }

    Ok(())
}

fn open_bridge(config: &Config) -> Result<CliBridge> {
    let resolver: Box<dyn NameResolver> = match &config.contacts {
        Some(path) => Box::new(ContactIndex::new(
            JsonContactStore::new(path),
            config.contacts_timeout,
        )),
        None => Box::new(NoContacts),
    };

    let bridge_config = BridgeConfig {
        snapshot: config.snapshot_path.clone(),
        ..BridgeConfig::new(&config.source_db)
    };
    Bridge::open(&bridge_config, resolver, Osascript)
        .with_context(|| format!("opening Messages store at {}", config.source_db.display()))
}

fn print_chats(chats: &[ChatSummary]) {
    for chat in chats {
        let marker = if chat.is_from_me { "you: " } else { "" };
        println!(
            "{:>6}  {:>8}  {:<3} {:<28} {}{}",
            chat.id,
            chat.time_label(),
            chat.initials,
            chat.name,
            marker,
            chat.preview
        );
    }
}

fn print_messages(bridge: &CliBridge, messages: &[DecodedMessage]) {
    for message in messages {
        let time = message.timestamp.map(tapback_types::time::time_label).unwrap_or_default();
        println!("[{:>8}] {}: {}", time, bridge.sender_label(message), message.text);
    }
}

fn export(bridge: &mut CliBridge, chats: u32, per_chat: u32, out: &Path) -> Result<()> {
    let conversations = bridge.latest_conversations(chats, per_chat)?;

    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut written = 0usize;

    for conversation in &conversations {
        for message in &conversation.messages {
            let record = ExportRecord {
                chat_id: conversation.chat_id,
                sender_label: bridge.sender_label(message),
                message,
            };
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            hasher.update(&line);
            writer.write_all(&line)?;
            written += 1;
        }
    }
    writer.flush()?;

    info!(
        "Exported {} messages from {} chats to {} (sha256 {})",
        written,
        conversations.len(),
        out.display(),
        hex::encode(hasher.finalize())
    );
    Ok(())
}

fn watch(bridge: &mut CliBridge, interval: Duration, limit: u32) -> Result<()> {
    info!("Watching every {:?}", interval);
    let mut previous: Option<Vec<ChatSummary>> = None;

    loop {
        bridge.refresh()?;
        let chats = bridge.recent_chats(limit)?;

        if previous.as_ref() != Some(&chats) {
            println!();
            print_chats(&chats);
            previous = Some(chats);
        }

        std::thread::sleep(interval);
    }
}
