//! tabula: Flatten a nested JSON document into relational tables
//!
//! Usage:
//!   # Read from file, write every table to stdout as one tagged stream
//!   tabula --schema schema.json data.json
//!
//!   # Read from stdin
//!   cat data.json | tabula --schema schema.json
//!
//!   # One CSV file per table
//!   tabula --schema schema.json data.json --output-dir ./tables --format csv

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use tabula::flatten::{parse_schema, ExportFormat, FlattenConfig, JsonFlattener, SingleWriter, TableWriter};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(about = "Flatten nested JSON into relational tables", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Schema file (version 2 envelope of table resolvers)
    #[arg(long, short = 's')]
    schema: PathBuf,

    /// Output directory for one file per table.
    /// If omitted, writes to stdout as a single JSON Lines stream tagged with `_table`
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// File format used with --output-dir: jsonl or csv
    #[arg(long, default_value = "jsonl")]
    format: ExportFormat,

    /// Deepest container level to enter (default: unlimited)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Let wildcards in the middle of a path match zero levels
    #[arg(long)]
    interior_zero_length_wildcards: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tabula=info".parse().expect("valid log directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let schema_text = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("Failed to read schema: {}", args.schema.display()))?;
    let resolvers = parse_schema(&schema_text)?;
    debug!(resolvers = resolvers.len(), "loaded schema");

    let reader = if let Some(path) = &args.input {
        let file = File::open(path).with_context(|| format!("Failed to open input: {}", path.display()))?;
        Box::new(BufReader::new(file)) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };
    let document = read_document(reader)?;

    let config = FlattenConfig {
        max_depth: args.max_depth,
        interior_zero_length_wildcards: args.interior_zero_length_wildcards,
    };
    let tables = JsonFlattener::new(config).flatten(&document, &resolvers)?;

    if let Some(output_dir) = args.output_dir {
        let writer = TableWriter::new(&output_dir, args.format)?;
        let written = writer.write_tables(&tables)?;
        info!(files = written.len(), dir = %output_dir.display(), "tables written");
    } else {
        let mut writer = SingleWriter::new(std::io::stdout().lock());
        writer.write_tables(&tables)?;
        writer.flush()?;
    }

    Ok(())
}

/// Read the whole document, trying SIMD parsing first
fn read_document(reader: Box<dyn Read>) -> Result<Value> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_end(&mut content).context("Failed to read input")?;

    // simd-json parses in place, so keep a pristine copy for the fallback
    let mut scratch = content.clone();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!(error = %e, "SIMD parse failed, falling back to serde_json");
            serde_json::from_slice(&content).context("Failed to parse JSON")
        }
    }
}
