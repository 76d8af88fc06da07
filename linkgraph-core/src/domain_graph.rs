// Domain-to-domain link graph plugins

use crate::config::{GraphConfig, TableConfig};
use crate::dedup::{Candidates, distinct_candidates, resolve_vertices};
use crate::edges::{domain_edges, id_edges};
use crate::error::Result;
use crate::model::{DomainEdge, IdEdge};
use crate::plugin::{GraphPlugin, GraphSummary, IndexedCorpus, LinkRecord, LinkRecorder, RunStats};
use crate::schema::SchemaField;
use crate::store::DomainIdStore;
use crate::writer::{ShardPlan, StagedOutput, write_adjacency, write_edge_table, write_vertex_table};
use linkgraph_extract::{Document, DocumentDomains, LinkExtractor};
use std::sync::Arc;
use tracing::{info, warn};

/// Extract a document's domains, or count it as skipped when its own URL
/// has no usable domain.
fn extract_or_skip(
    extractor: &LinkExtractor,
    document: &Document,
    stats: &RunStats,
) -> Option<DocumentDomains> {
    stats.record_document();
    match extractor.extract(document) {
        Ok(domains) => Some(domains),
        Err(e) => {
            warn!("Skipping document {}: {}", document.url, e);
            stats.record_skipped();
            None
        }
    }
}

/// Writes the graph as `"<src> <dst>"` text lines.
pub struct DomainToDomain {
    config: GraphConfig,
    extractor: LinkExtractor,
    links: LinkRecorder,
}

impl DomainToDomain {
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extractor: LinkExtractor::new(),
            links: LinkRecorder,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

impl GraphPlugin for DomainToDomain {
    fn name(&self) -> &str {
        "domain_to_domain"
    }

    fn contribute_schema(&self) -> Vec<SchemaField> {
        self.links.contribute_schema()
    }

    fn on_document_indexed(&self, document: &Document) -> LinkRecord {
        self.links.record(document)
    }

    fn on_corpus_collected(&self, corpus: &IndexedCorpus) -> Result<GraphSummary> {
        let stage = StagedOutput::create(&self.config.output_dir)?;
        let stats = RunStats::default();

        let candidates = distinct_candidates(
            corpus.documents(),
            self.config.partitions,
            |document, acc: &mut Candidates<DomainEdge>| {
                if let Some(domains) = extract_or_skip(&self.extractor, &document, &stats) {
                    acc.edges.extend(domain_edges(&domains));
                }
                Ok(())
            },
        )?;

        let edges = candidates.edges.len();
        info!("{} distinct domain edges", edges);

        let shards =
            ShardPlan::from_config(&self.config).assign(candidates.edges.into_partitions());
        write_adjacency(stage.path(), &shards)?;
        let output_dir = stage.commit()?;

        Ok(GraphSummary {
            plugin: self.name().to_string(),
            output_dir: Some(output_dir),
            documents: stats.documents(),
            skipped_documents: stats.skipped(),
            edges,
            vertices: None,
            shards: shards.len(),
        })
    }
}

/// Writes the graph as `edges` and `vertices` Parquet tables keyed by
/// domain ids.
pub struct DomainToDomainTables {
    config: TableConfig,
    store: Arc<dyn DomainIdStore>,
    extractor: LinkExtractor,
    links: LinkRecorder,
}

impl DomainToDomainTables {
    pub fn new(config: TableConfig, store: Arc<dyn DomainIdStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            extractor: LinkExtractor::new(),
            links: LinkRecorder,
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

impl GraphPlugin for DomainToDomainTables {
    fn name(&self) -> &str {
        "domain_to_domain_tables"
    }

    fn contribute_schema(&self) -> Vec<SchemaField> {
        self.links.contribute_schema()
    }

    fn on_document_indexed(&self, document: &Document) -> LinkRecord {
        self.links.record(document)
    }

    fn on_corpus_collected(&self, corpus: &IndexedCorpus) -> Result<GraphSummary> {
        let graph = &self.config.graph;
        let stage = StagedOutput::create(&graph.output_dir)?;
        let stats = RunStats::default();
        let store = self.store.as_ref();

        let candidates = distinct_candidates(
            corpus.documents(),
            graph.partitions,
            |document, acc: &mut Candidates<IdEdge>| {
                if let Some(domains) = extract_or_skip(&self.extractor, &document, &stats) {
                    acc.edges.extend(id_edges(&domains, store)?);
                    acc.vertices.extend(domains.into_domains());
                }
                Ok(())
            },
        )?;

        let edges = candidates.edges.len();
        info!(
            "{} distinct id edges, {} distinct domains",
            edges,
            candidates.vertices.len()
        );

        let vertex_rows = resolve_vertices(candidates.vertices, store, self.config.id_batch_size)?;
        let shards = ShardPlan::from_config(graph).assign(candidates.edges.into_partitions());

        write_edge_table(stage.path(), &shards, self.config.with_weight)?;
        let vertices = write_vertex_table(stage.path(), vertex_rows)?;
        let output_dir = stage.commit()?;

        Ok(GraphSummary {
            plugin: self.name().to_string(),
            output_dir: Some(output_dir),
            documents: stats.documents(),
            skipped_documents: stats.skipped(),
            edges,
            vertices: Some(vertices),
            shards: shards.len(),
        })
    }
}
