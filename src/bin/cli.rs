//! Cognate CLI
//!
//! Operator front-end for the reasoning-memory-correction core: seed a
//! knowledge base from a file, ask one-shot questions, or hold an
//! interactive chat session.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cognate::agent::{Agent, ReplyDisposition};
use cognate::audit::{AuditSink, JsonlSink};
use cognate::embedding::{Embedder, HashEmbedder};
use cognate::error::Result;
use cognate::memory::MemoryStore;
use cognate::types::{CoreConfig, MemoryItem, MemoryKind};

#[derive(Parser)]
#[command(name = "cognate")]
#[command(about = "Conversational reasoning core CLI")]
#[command(version)]
struct Cli {
    /// Violations log path (JSONL, append-only)
    #[arg(
        long,
        env = "COGNATE_VIOLATIONS_LOG",
        default_value = "data/violations.jsonl"
    )]
    violations_log: PathBuf,

    /// Corrections log path (JSONL, append-only)
    #[arg(
        long,
        env = "COGNATE_CORRECTIONS_LOG",
        default_value = "data/corrections.jsonl"
    )]
    corrections_log: PathBuf,

    /// Max correction retries per query
    #[arg(long, env = "COGNATE_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Accept unverified answers instead of rejecting on exhaustion
    #[arg(long)]
    lenient: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        query: String,
        /// Knowledge file to seed the store with (one statement per line)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },
    /// Interactive chat session
    Chat {
        /// Knowledge file to seed the store with (one statement per line)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },
    /// Seed a knowledge file and print store statistics
    Stats {
        /// Knowledge file to seed the store with (one statement per line)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = CoreConfig::default();
    if let Some(retries) = cli.max_retries {
        config.max_correction_retries = retries;
    }
    if cli.lenient {
        config.ethical_strict_mode = false;
    }

    let store = Arc::new(MemoryStore::new(
        config.embedding_dimensions,
        config.conversation_history_limit,
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.embedding_dimensions));
    let sink: Arc<dyn AuditSink> =
        Arc::new(JsonlSink::open(&cli.violations_log, &cli.corrections_log)?);
    let agent = Agent::new(Arc::clone(&store), Arc::clone(&embedder), sink, config)?;

    match cli.command {
        Commands::Ask { query, knowledge } => {
            seed_knowledge(&store, embedder.as_ref(), knowledge.as_deref())?;
            let mut session = agent.open_session();
            let reply = agent.answer(&mut session, &query)?;
            print_reply(&reply.text, reply.disposition, reply.attempts);
        }
        Commands::Chat { knowledge } => {
            seed_knowledge(&store, embedder.as_ref(), knowledge.as_deref())?;
            let mut session = agent.open_session();
            let stdin = io::stdin();
            println!("cognate v{} (type /quit to exit, /stats for counts)", cognate::VERSION);
            loop {
                print!("> ");
                io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();
                match line {
                    "" => continue,
                    "/quit" => break,
                    "/stats" => {
                        println!("{}", serde_json::to_string_pretty(&store.stats())?);
                        continue;
                    }
                    query => {
                        let reply = agent.answer(&mut session, query)?;
                        print_reply(&reply.text, reply.disposition, reply.attempts);
                    }
                }
            }
            session.close();
        }
        Commands::Stats { knowledge } => {
            seed_knowledge(&store, embedder.as_ref(), knowledge.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&store.stats())?);
        }
    }

    Ok(())
}

/// Load one knowledge statement per non-empty line.
fn seed_knowledge(store: &MemoryStore, embedder: &dyn Embedder, path: Option<&Path>) -> Result<usize> {
    let Some(path) = path else {
        return Ok(0);
    };

    let content = std::fs::read_to_string(path)?;
    let mut count = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let embedding = embedder.embed(line)?;
        let item = MemoryItem::new(line, embedding, MemoryKind::Knowledge, "file");
        store.record(item)?;
        count += 1;
    }
    Ok(count)
}

fn print_reply(text: &str, disposition: ReplyDisposition, attempts: u32) {
    let tag = match disposition {
        ReplyDisposition::Answered { verified: true } => "answered",
        ReplyDisposition::Answered { verified: false } => "answered (unverified)",
        ReplyDisposition::Refused => "refused",
        ReplyDisposition::Failed => "failed",
    };
    println!("{}", text);
    println!("  [{} after {} attempt(s)]", tag, attempts);
}
