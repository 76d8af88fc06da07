// Graph output: shard planning, staged commits, text and Parquet encoders

use crate::config::{GraphConfig, ensure_absent};
use crate::dedup::partition_of;
use crate::error::{GraphError, Result};
use crate::model::{DomainEdge, EDGE_WEIGHT, IdEdge, Vertex};
use crate::schema::{edge_schema, to_arrow_schema, vertex_schema};
use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashSet;
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker written into a committed output directory.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Rows per Parquet record batch.
pub const EDGE_BATCH_ROWS: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `"<src> <dst>"` lines
    Text,
    /// `edges` and `vertices` Parquet tables
    Tables,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(OutputFormat::Text),
            "tables" | "parquet" => Some(OutputFormat::Tables),
            _ => None,
        }
    }
}

/// How deduplicated partitions are mapped onto output shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPlan {
    /// One shard per partition.
    PerPartition,
    /// Merge neighbouring partitions into at most `n` shards.
    Coalesce(usize),
    /// Rehash every row into exactly `n` shards.
    Redistribute(usize),
}

impl ShardPlan {
    pub fn from_config(config: &GraphConfig) -> Self {
        match config.shard_count {
            None => ShardPlan::PerPartition,
            Some(n) if config.force_redistribute => ShardPlan::Redistribute(n),
            Some(n) => ShardPlan::Coalesce(n),
        }
    }

    pub fn shard_count(&self, partitions: usize) -> usize {
        let partitions = partitions.max(1);
        match *self {
            ShardPlan::PerPartition => partitions,
            ShardPlan::Coalesce(n) => n.clamp(1, partitions),
            ShardPlan::Redistribute(n) => n.max(1),
        }
    }

    /// Lay out partitions as shards. Rows inside each shard are sorted.
    pub fn assign<T: Hash + Eq + Ord>(&self, partitions: Vec<HashSet<T>>) -> Vec<Vec<T>> {
        let count = self.shard_count(partitions.len());
        let mut shards: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();

        match *self {
            ShardPlan::PerPartition => {
                for (idx, partition) in partitions.into_iter().enumerate() {
                    shards[idx].extend(partition);
                }
            }
            ShardPlan::Coalesce(_) => {
                let total = partitions.len().max(1);
                for (idx, partition) in partitions.into_iter().enumerate() {
                    shards[idx * count / total].extend(partition);
                }
            }
            ShardPlan::Redistribute(_) => {
                for item in partitions.into_iter().flatten() {
                    let idx = partition_of(&item, count);
                    shards[idx].push(item);
                }
            }
        }

        for shard in &mut shards {
            shard.sort_unstable();
        }
        shards
    }
}

pub fn shard_name(index: usize) -> String {
    format!("part-{:05}", index)
}

/// An output directory that only becomes visible once committed.
///
/// Everything is written to a hidden sibling directory which is renamed onto
/// the target by [`StagedOutput::commit`]. Dropping an uncommitted stage
/// removes it.
#[derive(Debug)]
pub struct StagedOutput {
    target: PathBuf,
    staging: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn create(target: &Path) -> Result<Self> {
        ensure_absent(target)?;

        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                GraphError::Config(format!("invalid output directory: {}", target.display()))
            })?;
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = parent.join(format!(".{}.{}.staging", name, uuid::Uuid::new_v4()));
        fs::create_dir(&staging)?;
        debug!("Staging output for {} in {}", target.display(), staging.display());

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Mark the stage complete and move it onto the target.
    pub fn commit(mut self) -> Result<PathBuf> {
        File::create(self.staging.join(SUCCESS_MARKER))?;

        // Something may have appeared at the target while we were writing
        ensure_absent(&self.target)?;
        if self.target.is_dir() {
            fs::remove_dir(&self.target)?;
        }

        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        info!("Committed output to {}", self.target.display());
        Ok(self.target.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.staging) {
            warn!(
                "Failed to remove staging directory {}: {}",
                self.staging.display(),
                e
            );
        }
    }
}

/// Write one `"<src> <dst>"` line per edge. Returns the number of lines.
pub fn write_adjacency(dir: &Path, shards: &[Vec<DomainEdge>]) -> Result<usize> {
    let mut written = 0;
    for (idx, shard) in shards.iter().enumerate() {
        let mut out = BufWriter::new(File::create(dir.join(shard_name(idx)))?);
        for edge in shard {
            writeln!(out, "{}", edge)?;
        }
        out.flush()?;
        written += shard.len();
    }
    Ok(written)
}

fn parquet_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

fn write_parquet<I>(path: &Path, schema: SchemaRef, batches: I) -> Result<()>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(parquet_properties()))?;
    for batch in batches {
        writer.write(&batch?)?;
    }
    writer.close()?;
    Ok(())
}

fn edge_batch(schema: &SchemaRef, rows: &[IdEdge], with_weight: bool) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|e| e.src))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|e| e.dst))),
    ];
    if with_weight {
        columns.push(Arc::new(Float64Array::from(vec![EDGE_WEIGHT; rows.len()])));
    }
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Write `edges/part-NNNNN.parquet`, one file per shard. Returns the row count.
pub fn write_edge_table(root: &Path, shards: &[Vec<IdEdge>], with_weight: bool) -> Result<usize> {
    let dir = root.join("edges");
    fs::create_dir_all(&dir)?;
    let schema = to_arrow_schema(&edge_schema(with_weight));

    let mut written = 0;
    for (idx, shard) in shards.iter().enumerate() {
        let path = dir.join(format!("{}.parquet", shard_name(idx)));
        // An empty shard still gets a file carrying the schema
        let batches: Vec<Result<RecordBatch>> = if shard.is_empty() {
            vec![edge_batch(&schema, &[], with_weight)]
        } else {
            shard
                .chunks(EDGE_BATCH_ROWS)
                .map(|rows| edge_batch(&schema, rows, with_weight))
                .collect()
        };
        write_parquet(&path, schema.clone(), batches)?;
        written += shard.len();
    }
    Ok(written)
}

/// Write `vertices/part-00000.parquet`, sorted by id. Returns the row count.
pub fn write_vertex_table(root: &Path, mut vertices: Vec<Vertex>) -> Result<usize> {
    let dir = root.join("vertices");
    fs::create_dir_all(&dir)?;
    let schema = to_arrow_schema(&vertex_schema());

    vertices.sort_unstable();
    let ids = Int64Array::from_iter_values(vertices.iter().map(|v| v.id));
    let domains = StringArray::from_iter_values(vertices.iter().map(|v| v.domain.as_str()));
    let columns: Vec<ArrayRef> = vec![Arc::new(ids), Arc::new(domains)];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    write_parquet(
        &dir.join(format!("{}.parquet", shard_name(0))),
        schema,
        [Ok(batch)],
    )?;
    Ok(vertices.len())
}
