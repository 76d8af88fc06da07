use crate::error::{GraphError, Result};
use crate::plugin::{GraphPlugin, GraphSummary, IndexedCorpus};
use crate::schema::{SchemaField, document_base_schema};
use crate::source::{Corpus, ProgressCallback, SCHEMA_FILE};
use crate::writer::{StagedOutput, shard_name};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Options for configuring a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub show_progress: bool,
}

/// Result of writing an intermediate document dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpSummary {
    pub output_dir: PathBuf,
    pub documents: usize,
    pub shards: usize,
}

/// Owns the plugins and drives a corpus through them.
pub struct Pipeline {
    plugins: Vec<Box<dyn GraphPlugin>>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            plugins: Vec::new(),
            options,
        }
    }

    pub fn with_plugin<P: GraphPlugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn GraphPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> &[Box<dyn GraphPlugin>] {
        &self.plugins
    }

    /// `url` followed by every plugin's contributed fields.
    pub fn document_schema(&self) -> Vec<SchemaField> {
        let mut schema = document_base_schema();
        for plugin in &self.plugins {
            for field in plugin.contribute_schema() {
                if !schema.iter().any(|existing| existing.name == field.name) {
                    schema.push(field);
                }
            }
        }
        schema
    }

    /// A corpus written by an earlier dump must carry every field the
    /// plugins rely on.
    fn check_corpus_schema(&self, corpus: &Corpus) -> Result<()> {
        let Some(available) = corpus.schema() else {
            return Ok(());
        };

        for plugin in &self.plugins {
            for field in plugin.contribute_schema() {
                if !available.contains(&field) {
                    return Err(GraphError::Config(format!(
                        "input is missing field '{}' required by plugin {}",
                        field.name,
                        plugin.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn progress_bar(&self, message: &str) -> Option<ProgressBar> {
        if !self.options.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        Some(pb)
    }

    fn progress_callback(pb: &Option<ProgressBar>, label: &str) -> Option<ProgressCallback> {
        let pb = pb.clone()?;
        let label = label.to_string();
        Some(Arc::new(move |count: usize| {
            pb.set_message(format!("{}... {} documents processed", label, count));
            pb.tick();
        }))
    }

    /// Run every plugin's collection pass over the corpus.
    pub fn run(&self, corpus: &Corpus) -> Result<Vec<GraphSummary>> {
        if self.plugins.is_empty() {
            return Err(GraphError::Config("no graph plugins configured".to_string()));
        }
        self.check_corpus_schema(corpus)?;

        let mut summaries = Vec::with_capacity(self.plugins.len());
        for plugin in &self.plugins {
            info!("Collecting corpus for {}", plugin.name());
            let label = format!("Building {}", plugin.name());

            let pb = self.progress_bar(&label);
            let mut indexed = IndexedCorpus::new(corpus, &self.plugins);
            if let Some(callback) = Self::progress_callback(&pb, &label) {
                indexed = indexed.with_progress(callback);
            }

            let result = plugin.on_corpus_collected(&indexed);
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            let summary = result?;
            info!(
                "{}: {} documents, {} edges",
                summary.plugin, summary.documents, summary.edges
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Write the indexed records as JSON lines plus their schema, so the
    /// graph stage can later be run from the dump alone.
    ///
    /// Records are streamed into one shard per worker thread as they are
    /// indexed; the order of records within and across shards is unspecified.
    pub fn dump(&self, corpus: &Corpus, output_dir: &Path) -> Result<DumpSummary> {
        self.check_corpus_schema(corpus)?;
        let stage = StagedOutput::create(output_dir)?;

        let shard_count = rayon::current_num_threads().max(1);
        let writers = (0..shard_count)
            .map(|idx| -> Result<Mutex<BufWriter<File>>> {
                let path = stage.path().join(format!("{}.jsonl", shard_name(idx)));
                Ok(Mutex::new(BufWriter::new(File::create(path)?)))
            })
            .collect::<Result<Vec<_>>>()?;

        let label = "Dumping documents";
        let pb = self.progress_bar(label);
        let mut indexed = IndexedCorpus::new(corpus, &self.plugins);
        if let Some(callback) = Self::progress_callback(&pb, label) {
            indexed = indexed.with_progress(callback);
        }

        let written = indexed
            .documents()
            .map(|document| -> Result<usize> {
                let line = serde_json::to_string(&document?)?;
                let shard = rayon::current_thread_index().unwrap_or(0) % writers.len();
                let mut out = writers[shard].lock().map_err(|_| poisoned_writer())?;
                writeln!(out, "{}", line)?;
                Ok(1)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b));
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        let documents = written?;

        for writer in writers {
            writer.into_inner().map_err(|_| poisoned_writer())?.flush()?;
        }

        let schema = serde_json::to_string_pretty(&self.document_schema())?;
        fs::write(stage.path().join(SCHEMA_FILE), schema)?;

        let output_dir = stage.commit()?;
        info!(
            "Dumped {} documents to {} shard(s) in {}",
            documents,
            shard_count,
            output_dir.display()
        );

        Ok(DumpSummary {
            output_dir,
            documents,
            shards: shard_count,
        })
    }
}

fn poisoned_writer() -> GraphError {
    GraphError::Io(io::Error::other("dump shard writer lock poisoned"))
}
