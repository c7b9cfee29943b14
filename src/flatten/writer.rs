use crate::flatten::types::{Table, Tables};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Text format used when writing tables to files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// One JSON object per row
    #[default]
    JsonLines,
    /// Header line followed by one record per row
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::JsonLines => "jsonl",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" | "json-lines" => Ok(ExportFormat::JsonLines),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{}' (expected jsonl or csv)", other)),
        }
    }
}

/// Writes each table to its own file in an output directory
pub struct TableWriter {
    output_dir: PathBuf,
    format: ExportFormat,
}

impl TableWriter {
    /// Create a writer for `output_dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(output_dir: P, format: ExportFormat) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        Ok(TableWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            format,
        })
    }

    /// Write every table, returning the paths written
    pub fn write_tables(&self, tables: &Tables) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(tables.len());
        for (name, table) in tables.iter() {
            let path = self
                .output_dir
                .join(format!("{}.{}", file_stem(name), self.format.extension()));
            let file = File::create(&path)
                .with_context(|| format!("Failed to open file: {}", path.display()))?;
            let mut out = BufWriter::new(file);

            match self.format {
                ExportFormat::JsonLines => write_jsonl(&mut out, table)?,
                ExportFormat::Csv => write_csv(&mut out, table)?,
            }
            out.flush().context("Failed to flush writer")?;

            tracing::info!(table = name, rows = table.len(), path = %path.display(), "wrote table");
            written.push(path);
        }
        Ok(written)
    }
}

/// Table names may contain anything; keep file names portable
fn file_stem(table_name: &str) -> String {
    let stem: String = table_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.is_empty() || stem.starts_with('.') {
        format!("_{}", stem)
    } else {
        stem
    }
}

/// Write the rows of `table` as JSON Lines, columns in header order
pub fn write_jsonl<W: Write>(writer: &mut W, table: &Table) -> Result<()> {
    for row in table.rows() {
        let json = serde_json::to_string(&table.record(row)).context("Failed to serialize row")?;
        writeln!(writer, "{}", json).context("Failed to write row")?;
    }
    Ok(())
}

/// Write `table` as CSV; missing cells become empty fields
pub fn write_csv<W: Write>(writer: W, table: &Table) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);

    wtr.write_record(table.header()).context("Failed to write CSV header")?;
    for row in table.rows() {
        let record: Vec<String> = table.cells(row).map(ToString::to_string).collect();
        wtr.write_record(&record).context("Failed to write CSV record")?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Writes all tables to one JSON Lines stream, tagging each row with its table
pub struct SingleWriter<W: Write> {
    writer: W,
}

impl<W: Write> SingleWriter<W> {
    pub fn new(writer: W) -> Self {
        SingleWriter { writer }
    }

    pub fn write_tables(&mut self, tables: &Tables) -> Result<()> {
        for (name, table) in tables.iter() {
            for row in table.rows() {
                let mut data = serde_json::Map::new();
                data.insert("_table".to_string(), Value::String(name.to_string()));
                data.extend(table.record(row));

                let json = serde_json::to_string(&data).context("Failed to serialize row")?;
                writeln!(self.writer, "{}", json).context("Failed to write row")?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
