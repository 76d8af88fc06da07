use crate::error::{GraphError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of hash partitions used while deduplicating.
pub const DEFAULT_PARTITIONS: usize = 16;

/// Default number of domains per identifier store round trip.
pub const DEFAULT_ID_BATCH_SIZE: usize = 1000;

/// Output settings shared by both graph targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    pub output_dir: PathBuf,
    /// Target number of output shards. `None` writes one shard per partition.
    pub shard_count: Option<usize>,
    /// Redistribute rows by hash instead of merging neighbouring partitions
    /// when `shard_count` is set.
    pub force_redistribute: bool,
    pub partitions: usize,
}

impl GraphConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            shard_count: None,
            force_redistribute: false,
            partitions: DEFAULT_PARTITIONS,
        }
    }

    pub fn with_shard_count(mut self, shard_count: Option<usize>) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_force_redistribute(mut self, force_redistribute: bool) -> Self {
        self.force_redistribute = force_redistribute;
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(GraphError::Config("output directory is required".to_string()));
        }
        if self.shard_count == Some(0) {
            return Err(GraphError::Config("shard count must be at least 1".to_string()));
        }
        if self.partitions == 0 {
            return Err(GraphError::Config("partition count must be at least 1".to_string()));
        }
        ensure_absent(&self.output_dir)
    }
}

/// Settings of the edge/vertex table target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub graph: GraphConfig,
    /// Emit the constant `weight` column on the edge table.
    pub with_weight: bool,
    pub id_batch_size: usize,
}

impl TableConfig {
    pub fn new(graph: GraphConfig) -> Self {
        Self {
            graph,
            with_weight: false,
            id_batch_size: DEFAULT_ID_BATCH_SIZE,
        }
    }

    pub fn with_weight(mut self, with_weight: bool) -> Self {
        self.with_weight = with_weight;
        self
    }

    pub fn with_id_batch_size(mut self, id_batch_size: usize) -> Self {
        self.id_batch_size = id_batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_batch_size == 0 {
            return Err(GraphError::Config("id batch size must be at least 1".to_string()));
        }
        self.graph.validate()
    }
}

/// A missing path or an empty directory may be written to. Anything else is
/// an `OutputExists` conflict.
pub fn ensure_absent(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
        Ok(meta) if meta.is_dir() => {
            if fs::read_dir(path)?.next().is_none() {
                Ok(())
            } else {
                Err(GraphError::OutputExists(path.to_path_buf()))
            }
        }
        Ok(_) => Err(GraphError::OutputExists(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::new("/tmp/out");

        assert_eq!(config.shard_count, None);
        assert!(!config.force_redistribute);
        assert_eq!(config.partitions, DEFAULT_PARTITIONS);
    }

    #[test]
    fn test_empty_output_dir_is_rejected() {
        let result = GraphConfig::new("").validate();
        assert!(matches!(result, Err(GraphError::Config(_))));
    }

    #[test]
    fn test_zero_shards_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = GraphConfig::new(dir.path().join("out")).with_shard_count(Some(0));

        assert!(matches!(config.validate(), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_zero_partitions_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = GraphConfig::new(dir.path().join("out")).with_partitions(0);

        assert!(matches!(config.validate(), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config =
            TableConfig::new(GraphConfig::new(dir.path().join("out"))).with_id_batch_size(0);

        assert!(matches!(config.validate(), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_output_conflicts() {
        let dir = TempDir::new().unwrap();

        // Missing and empty targets are fine
        assert!(ensure_absent(&dir.path().join("missing")).is_ok());
        assert!(ensure_absent(dir.path()).is_ok());

        fs::write(dir.path().join("part-00000"), "a.com b.com\n").unwrap();
        assert!(matches!(
            ensure_absent(dir.path()),
            Err(GraphError::OutputExists(_))
        ));
        assert!(matches!(
            ensure_absent(&dir.path().join("part-00000")),
            Err(GraphError::OutputExists(_))
        ));
    }

    #[test]
    fn test_valid_config() {
        let dir = TempDir::new().unwrap();
        let config = TableConfig::new(
            GraphConfig::new(dir.path().join("graph"))
                .with_shard_count(Some(4))
                .with_force_redistribute(true),
        )
        .with_weight(true);

        assert!(config.validate().is_ok());
    }
}
