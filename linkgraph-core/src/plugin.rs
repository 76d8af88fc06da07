use crate::error::Result;
use crate::schema::{SchemaField, external_links_field};
use crate::source::{Corpus, DocumentResult, ProgressCallback};
use linkgraph_extract::{Document, ExternalLink};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fields a plugin records for a document at index time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub external_links: Vec<ExternalLink>,
}

/// What a plugin did with the collected corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub plugin: String,
    pub output_dir: Option<PathBuf>,
    pub documents: usize,
    pub skipped_documents: usize,
    pub edges: usize,
    pub vertices: Option<usize>,
    pub shards: usize,
}

/// Extension point invoked by the pipeline.
///
/// `contribute_schema` and `on_document_indexed` run for every document of
/// the corpus and decide what is recorded about it. `on_corpus_collected`
/// runs once over the indexed corpus and writes the plugin's output.
pub trait GraphPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn contribute_schema(&self) -> Vec<SchemaField>;

    fn on_document_indexed(&self, document: &Document) -> LinkRecord;

    fn on_corpus_collected(&self, corpus: &IndexedCorpus) -> Result<GraphSummary>;
}

/// Records the cleaned outbound links of every document and writes nothing
/// at collection time. Used on its own for dumps, and by the graph plugins
/// for their per-document hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkRecorder;

impl LinkRecorder {
    /// Trimmed hrefs, without blanks and same-page fragments.
    pub fn record(&self, document: &Document) -> LinkRecord {
        let external_links = document
            .hrefs()
            .map(str::trim)
            .filter(|href| !href.is_empty() && !href.starts_with('#'))
            .map(ExternalLink::new)
            .collect();
        LinkRecord { external_links }
    }
}

impl GraphPlugin for LinkRecorder {
    fn name(&self) -> &str {
        "external_links"
    }

    fn contribute_schema(&self) -> Vec<SchemaField> {
        vec![external_links_field()]
    }

    fn on_document_indexed(&self, document: &Document) -> LinkRecord {
        self.record(document)
    }

    fn on_corpus_collected(&self, corpus: &IndexedCorpus) -> Result<GraphSummary> {
        let documents = corpus.documents().try_fold(|| 0usize, |n, doc| doc.map(|_| n + 1));
        let documents = documents.try_reduce(|| 0, |a, b| Ok(a + b))?;

        Ok(GraphSummary {
            plugin: self.name().to_string(),
            output_dir: None,
            documents,
            skipped_documents: 0,
            edges: 0,
            vertices: None,
            shards: 0,
        })
    }
}

/// Apply every plugin's per-document hook.
///
/// Link records are merged in plugin order, keeping the first occurrence of
/// each href. Without plugins the document is returned unchanged.
pub fn index_document(document: Document, plugins: &[Box<dyn GraphPlugin>]) -> Document {
    if plugins.is_empty() {
        return document;
    }

    let mut seen = HashSet::new();
    let mut external_links = Vec::new();
    for plugin in plugins {
        for link in plugin.on_document_indexed(&document).external_links {
            if seen.insert(link.href.clone()) {
                external_links.push(link);
            }
        }
    }

    Document {
        url: document.url,
        external_links,
    }
}

/// A corpus viewed through the pipeline's plugins.
pub struct IndexedCorpus<'a> {
    corpus: &'a Corpus,
    plugins: &'a [Box<dyn GraphPlugin>],
    progress: Option<ProgressCallback>,
}

impl<'a> IndexedCorpus<'a> {
    pub fn new(corpus: &'a Corpus, plugins: &'a [Box<dyn GraphPlugin>]) -> Self {
        Self {
            corpus,
            plugins,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn documents(&self) -> impl ParallelIterator<Item = DocumentResult> + '_ {
        let seen = Arc::new(AtomicUsize::new(0));
        let progress = self.progress.clone();
        let plugins = self.plugins;

        self.corpus.documents().map(move |document| {
            let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref callback) = progress {
                callback(count);
            }
            document.map(|document| index_document(document, plugins))
        })
    }
}

/// Document counters shared by the workers of one collection pass.
#[derive(Debug, Default)]
pub struct RunStats {
    documents: AtomicUsize,
    skipped: AtomicUsize,
}

impl RunStats {
    pub fn record_document(&self) {
        self.documents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLinks(&'static [&'static str]);

    impl GraphPlugin for FixedLinks {
        fn name(&self) -> &str {
            "fixed"
        }

        fn contribute_schema(&self) -> Vec<SchemaField> {
            Vec::new()
        }

        fn on_document_indexed(&self, _document: &Document) -> LinkRecord {
            LinkRecord {
                external_links: self.0.iter().copied().map(ExternalLink::new).collect(),
            }
        }

        fn on_corpus_collected(&self, _corpus: &IndexedCorpus) -> Result<GraphSummary> {
            unreachable!()
        }
    }

    #[test]
    fn test_link_recorder_cleans_hrefs() {
        let doc = Document::with_links(
            "http://a.com/",
            ["  http://b.com/  ", "", "   ", "#top", "/about", "mailto:x@a.com"],
        );

        let record = LinkRecorder.record(&doc);

        let hrefs: Vec<_> = record.external_links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(hrefs, vec!["http://b.com/", "/about", "mailto:x@a.com"]);
    }

    #[test]
    fn test_index_document_without_plugins() {
        let doc = Document::with_links("http://a.com/", ["#x"]);
        assert_eq!(index_document(doc.clone(), &[]), doc);
    }

    #[test]
    fn test_index_document_merges_plugins() {
        let plugins: Vec<Box<dyn GraphPlugin>> = vec![
            Box::new(FixedLinks(&["http://b.com/", "http://c.com/"])),
            Box::new(FixedLinks(&["http://c.com/", "http://d.com/"])),
        ];

        let indexed = index_document(Document::new("http://a.com/"), &plugins);

        let hrefs: Vec<_> = indexed.hrefs().collect();
        assert_eq!(hrefs, vec!["http://b.com/", "http://c.com/", "http://d.com/"]);
        assert_eq!(indexed.url, "http://a.com/");
    }

    #[test]
    fn test_link_recorder_counts_documents() {
        let corpus = Corpus::from_documents(vec![
            Document::new("http://a.com/"),
            Document::new("http://b.com/"),
        ]);
        let plugins: Vec<Box<dyn GraphPlugin>> = vec![Box::new(LinkRecorder)];

        let summary = LinkRecorder
            .on_corpus_collected(&IndexedCorpus::new(&corpus, &plugins))
            .unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.output_dir, None);
    }
}
