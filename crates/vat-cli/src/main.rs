// ============================================================================
// vat - command line front end for the personal memory store
// ============================================================================
// Usage:
//   vat record "text" [--metadata '{"k":"v"}']   Store a memory
//   vat retrieve "query" [--top-k 5]              Similarity search
//   vat recent [--limit 10]                       Newest memories (sampled)
//   vat visualize [--open]                        Render the embedding map
//   vat stats                                     Collection statistics
//   vat serve                                     JSON-lines tool loop on stdio
// ============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use vat_core::memory::{DEFAULT_RECENT_LIMIT, DEFAULT_TOP_K};
use vat_core::{logging, tools, MemoryConfig, MemoryEntry, MemoryManager};

/// Personal long-term memory store
#[derive(Parser)]
#[command(name = "vat", version, about = "Record, search and visualize your memories")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store a piece of text
    Record {
        content: String,

        /// JSON object attached to every chunk
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Find memories most similar to a query
    Retrieve {
        query: String,

        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: u64,
    },

    /// List the newest memories within a bounded sample
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: u32,
    },

    /// Project stored embeddings to 2-d and write an interactive HTML plot
    Visualize {
        /// Open the document in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Show collection statistics
    Stats,

    /// Serve tool calls as JSON lines on stdin/stdout
    Serve,
}

fn parse_metadata(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    raw.map(|s| {
        serde_json::from_str::<Map<String, Value>>(s)
            .context("--metadata must be a JSON object")
    })
    .transpose()
}

fn print_entries(entries: &[MemoryEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    for entry in entries {
        println!("[{}] {}", entry.timestamp, entry.content);
        if !entry.metadata.is_empty() {
            println!("    {}", Value::Object(entry.metadata.clone()));
        }
    }
    println!("\nTotal: {} memories", entries.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MemoryConfig::from_env()?;
    logging::init(&config.app_dir)?;
    let manager = MemoryManager::new(config)?;

    match cli.command {
        Commands::Record { content, metadata } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            let outcome = manager.record(&content, metadata).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{} ({} chunks)", outcome.status, outcome.ids.len());
            }
        }
        Commands::Retrieve { query, top_k } => {
            let entries = manager.retrieve(&query, top_k).await?;
            print_entries(&entries, cli.json)?;
        }
        Commands::Recent { limit } => {
            let entries = manager.recent(limit).await?;
            print_entries(&entries, cli.json)?;
        }
        Commands::Visualize { open } => {
            let report = manager.visualize().await?;
            println!("{}", report);
            println!("({} points, {})", report.point_count, report.reducer);
            if open {
                open::that(&report.path).context("Failed to open visualization")?;
            }
        }
        Commands::Stats => {
            let stats = manager.stats().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("=== Memory Store Stats ===");
                println!("Store:      {}", stats.store);
                println!("Collection: {}", stats.collection);
                println!("Points:     {}", stats.points_count);
            }
        }
        Commands::Serve => serve(&manager).await?,
    }

    Ok(())
}

async fn serve(manager: &MemoryManager) -> Result<()> {
    info!("Serving tool calls on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = tools::handle_line(manager, &line).await;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        assert!(parse_metadata(None).unwrap().is_none());
        let map = parse_metadata(Some(r#"{"source":"journal"}"#)).unwrap().unwrap();
        assert_eq!(map["source"], "journal");
        assert!(parse_metadata(Some("[1,2]")).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["vat", "retrieve", "climbing"]);
        match cli.command {
            Commands::Retrieve { query, top_k } => {
                assert_eq!(query, "climbing");
                assert_eq!(top_k, 5);
            }
            _ => panic!("expected retrieve"),
        }
    }
}
