use anyhow::Result;
use clap::{Parser, Subcommand};
use gramsearch_core::{Index, PostingStore, SledStore};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    text: String,
    #[serde(default)]
    meta: HashMap<String, String>,
}

#[derive(Parser)]
#[command(name = "gramsearch-indexer")]
#[command(about = "Bulk-load documents into the phrase index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load documents from JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Store database path
        #[arg(long, default_value = "./data")]
        db: String,
        /// Sorted-set key all postings share
        #[arg(long, default_value = "index")]
        collection: String,
        /// Wipe the store before loading
        #[arg(long, default_value_t = false)]
        flush: bool,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            db,
            collection,
            flush,
        } => build(&input, &db, &collection, flush),
    }
}

fn build(input: &str, db: &str, collection: &str, flush: bool) -> Result<()> {
    let store = SledStore::open(db)?;
    if flush {
        tracing::warn!(db, "flushing store before load");
        store.flush_all()?;
    }
    let index = Index::new(store, collection);

    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }

    let started = Instant::now();
    let mut indexed = 0usize;
    for file in files {
        let count = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            index_jsonl(&index, &file)?
        } else {
            index_json(&index, &file)?
        };
        tracing::info!(file = %file.display(), count, "loaded file");
        indexed += count;
    }

    tracing::info!(
        indexed,
        elapsed_s = started.elapsed().as_secs_f64(),
        "index build complete"
    );
    Ok(())
}

fn index_jsonl<S: PostingStore>(index: &Index<S>, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let mut count = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)?;
        ingest(index, doc)?;
        count += 1;
    }
    Ok(count)
}

fn index_json<S: PostingStore>(index: &Index<S>, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let mut count = 0;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                ingest(index, doc)?;
                count += 1;
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            ingest(index, doc)?;
            count += 1;
        }
        _ => {}
    }
    Ok(count)
}

fn ingest<S: PostingStore>(index: &Index<S>, doc: InputDoc) -> Result<()> {
    index.index_document(&doc.id, &doc.meta, &doc.text)?;
    Ok(())
}
