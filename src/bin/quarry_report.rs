//! quarry-report: extract declarative reports from an inventory snapshot
//!
//! Usage:
//!   # Aligned text table to stdout
//!   quarry-report vm.yaml inventory.json
//!
//!   # Read the snapshot from stdin, one JSON row per object
//!   cat inventory.json | quarry-report vm.yaml --format rows
//!
//!   # Full nested documents to a file
//!   quarry-report vm.yaml inventory.json --format docs -o report.json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use quarry::graph::{collect_objects, select_roots};
use quarry::{render_table, Extraction, Extractor, MemoryObject, Schema};
use serde_json::Value;
use std::io::{Read, Write};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "quarry-report")]
#[command(about = "Extract declarative reports from an inventory snapshot", long_about = None)]
struct Args {
    /// Report schema file (YAML)
    #[arg(value_name = "SCHEMA")]
    schema: String,

    /// Inventory snapshot file (JSON; use stdin if omitted)
    #[arg(value_name = "INPUT")]
    input: Option<String>,

    /// Output shape
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Root object type, overriding the schema's `type` key
    #[arg(long = "type", value_name = "TYPE")]
    object_type: Option<String>,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    /// Aligned text table of the tabular rows
    Table,
    /// One JSON object per line, tabular rows
    Rows,
    /// JSON array of full nested documents
    Docs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let schema_text = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("Failed to read schema file: {}", args.schema))?;
    let schema = Schema::load(&schema_text)
        .with_context(|| format!("Failed to load schema: {}", args.schema))?;

    let inventory = read_inventory(args.input.as_deref())?;
    let graph = MemoryObject::from_json(&inventory).context("Failed to build object graph")?;

    let object_type = args
        .object_type
        .as_deref()
        .or(schema.object_type())
        .map(str::to_string);
    let roots = match &object_type {
        Some(type_name) => select_roots(&graph, type_name),
        None => collect_objects(&graph),
    };

    let extractor = Extractor::new(&schema);
    let mut extractions = Vec::with_capacity(roots.len());
    let mut failures = 0usize;
    for result in extractor.extract_all(&roots) {
        match result {
            Ok(extraction) => extractions.push(extraction),
            Err(_) => failures += 1,
        }
    }
    if failures > 0 {
        warn!(failures, "some objects could not be extracted");
    }

    let rendered = render(&schema, &extractions, args.format)?;
    match args.output {
        Some(path) => std::fs::write(&path, rendered)
            .with_context(|| format!("Failed to write output file: {}", path))?,
        None => std::io::stdout().write_all(rendered.as_bytes())?,
    }

    Ok(())
}

fn read_inventory(input: Option<&str>) -> Result<Value> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };
    serde_json::from_str(&text).context("Failed to parse inventory JSON")
}

fn render(schema: &Schema, extractions: &[Extraction], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<_> = extractions.iter().map(|e| e.row.clone()).collect();
            Ok(render_table(schema.tabulate(), &rows))
        }
        OutputFormat::Rows => {
            let mut out = String::new();
            for extraction in extractions {
                out.push_str(&serde_json::to_string(&extraction.row)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Docs => {
            let documents: Vec<_> = extractions.iter().map(|e| e.document.clone()).collect();
            let mut out = serde_json::to_string_pretty(&documents)?;
            out.push('\n');
            Ok(out)
        }
    }
}
