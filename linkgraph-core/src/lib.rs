pub mod config;
pub mod data;
pub mod dedup;
pub mod domain_graph;
pub mod edges;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod plugin;
pub mod schema;
pub mod source;
pub mod store;
pub mod writer;

pub use config::{GraphConfig, TableConfig};
pub use data::Database;
pub use domain_graph::{DomainToDomain, DomainToDomainTables};
pub use error::{GraphError, Result, StoreError};
pub use model::{DomainEdge, DomainId, EDGE_WEIGHT, IdEdge, Vertex};
pub use pipeline::{DumpSummary, Pipeline, PipelineOptions};
pub use plugin::{GraphPlugin, GraphSummary, IndexedCorpus, LinkRecord, LinkRecorder};
pub use source::Corpus;
pub use store::{DomainIdStore, MemoryStore, RetryPolicy, Retrying};
pub use writer::{OutputFormat, ShardPlan};
