use crate::error::{GraphError, Result};
use crate::schema::SchemaField;
use linkgraph_extract::{Document, ExtractError};
use rayon::iter::Either;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Lines};
use std::iter::Enumerate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Name of the schema file stored next to a document dump.
pub const SCHEMA_FILE: &str = "_schema.json";

/// Extensions recognised as JSON-lines shards inside an input directory.
const SHARD_EXTENSIONS: &[&str] = &["jsonl", "ndjson"];

/// Lines read from a shard before the batch is parsed in parallel.
const READ_BATCH_LINES: usize = 1024;

pub type DocumentResult = std::result::Result<Document, ExtractError>;

/// Callback for reporting how many documents have been read so far
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

enum Inputs {
    Documents(Vec<Document>),
    Files(Vec<PathBuf>),
}

/// A corpus of documents, either held in memory or read from JSON-lines
/// shards.
pub struct Corpus {
    inputs: Inputs,
    schema: Option<Vec<SchemaField>>,
    progress: Option<ProgressCallback>,
}

impl Corpus {
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self {
            inputs: Inputs::Documents(documents),
            schema: None,
            progress: None,
        }
    }

    /// Collect input shards from files and directories.
    ///
    /// A directory contributes every `*.jsonl` / `*.ndjson` file directly
    /// inside it, and its `_schema.json` if present.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::new();
        let mut schema: Option<Vec<SchemaField>> = None;

        for path in paths {
            if path.is_dir() {
                let mut shards = Vec::new();
                for entry in fs::read_dir(path)? {
                    let entry_path = entry?.path();
                    let is_shard = entry_path.is_file()
                        && entry_path
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| SHARD_EXTENSIONS.contains(&ext));
                    if is_shard {
                        shards.push(entry_path);
                    }
                }
                shards.sort();
                debug!("{} shard(s) in {}", shards.len(), path.display());
                files.extend(shards);

                let schema_path = path.join(SCHEMA_FILE);
                if schema_path.is_file() {
                    let loaded = load_schema(&schema_path)?;
                    match &schema {
                        Some(existing) if *existing != loaded => {
                            return Err(GraphError::Config(format!(
                                "input directories carry different schemas: {}",
                                schema_path.display()
                            )));
                        }
                        _ => schema = Some(loaded),
                    }
                }
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                return Err(GraphError::Config(format!(
                    "input not found: {}",
                    path.display()
                )));
            }
        }

        if files.is_empty() {
            return Err(GraphError::Config("no input files".to_string()));
        }

        info!("Reading corpus from {} file(s)", files.len());
        Ok(Self {
            inputs: Inputs::Files(files),
            schema,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Schema of the records, if the corpus was written by a dump.
    pub fn schema(&self) -> Option<&[SchemaField]> {
        self.schema.as_deref()
    }

    pub fn files(&self) -> &[PathBuf] {
        match &self.inputs {
            Inputs::Files(files) => files,
            Inputs::Documents(_) => &[],
        }
    }

    /// Stream every document in parallel. Each file is read in batches of
    /// lines that are parsed across the pool. Blank lines are skipped; a line
    /// that does not parse is an error naming its file and line number.
    pub fn documents(&self) -> impl ParallelIterator<Item = DocumentResult> + '_ {
        let seen = Arc::new(AtomicUsize::new(0));
        let progress = self.progress.clone();

        let documents = match &self.inputs {
            Inputs::Documents(documents) => {
                Either::Left(documents.par_iter().cloned().map(Ok::<_, ExtractError>))
            }
            Inputs::Files(files) => {
                Either::Right(files.par_iter().flat_map(|path| read_shard(path)))
            }
        };

        documents.inspect(move |_| {
            let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref callback) = progress {
                callback(count);
            }
        })
    }
}

pub fn load_schema(path: &Path) -> Result<Vec<SchemaField>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Numbered lines of a file, handed out `size` at a time.
struct LineBatches<R> {
    lines: Enumerate<Lines<R>>,
    size: usize,
}

impl<R: BufRead> LineBatches<R> {
    fn new(reader: R, size: usize) -> Self {
        Self {
            lines: reader.lines().enumerate(),
            size,
        }
    }
}

impl<R: BufRead> Iterator for LineBatches<R> {
    type Item = io::Result<Vec<(usize, String)>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.size);
        for (idx, line) in self.lines.by_ref() {
            match line {
                Ok(line) => batch.push((idx + 1, line)),
                Err(e) => return Some(Err(e)),
            }
            if batch.len() == self.size {
                break;
            }
        }
        (!batch.is_empty()).then_some(Ok(batch))
    }
}

fn parse_line(path: &Path, line_no: usize, line: &str) -> Option<DocumentResult> {
    if line.trim().is_empty() {
        return None;
    }
    Some(Document::from_json_line(line).map_err(|e| match e {
        ExtractError::ParseError(msg) => {
            ExtractError::ParseError(format!("{}:{}: {}", path.display(), line_no, msg))
        }
        other => other,
    }))
}

fn io_failure(e: io::Error) -> rayon::iter::Once<DocumentResult> {
    rayon::iter::once(Err(ExtractError::IoError(e)))
}

fn read_shard(path: &Path) -> impl ParallelIterator<Item = DocumentResult> + use<> {
    let path = Arc::new(path.to_path_buf());
    let file = match File::open(path.as_path()) {
        Ok(file) => file,
        Err(e) => return Either::Left(io_failure(e)),
    };

    Either::Right(
        LineBatches::new(BufReader::new(file), READ_BATCH_LINES)
            .par_bridge()
            .flat_map(move |batch| match batch {
                Err(e) => Either::Left(io_failure(e)),
                Ok(lines) => {
                    let path = path.clone();
                    Either::Right(
                        lines
                            .into_par_iter()
                            .filter_map(move |(line_no, line)| parse_line(&path, line_no, &line)),
                    )
                }
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::external_links_field;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn numbered_corpus(count: usize) -> String {
        (0..count)
            .map(|i| format!("{{\"url\": \"http://d{}.com/\"}}\n", i))
            .collect()
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn collect(corpus: &Corpus) -> std::result::Result<Vec<Document>, ExtractError> {
        let mut docs: Vec<Document> = corpus
            .documents()
            .collect::<std::result::Result<Vec<Document>, ExtractError>>()?;
        docs.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(docs)
    }

    #[test]
    fn test_in_memory_corpus() {
        let corpus = Corpus::from_documents(vec![
            Document::new("http://b.com/"),
            Document::new("http://a.com/"),
        ]);

        let docs = collect(&corpus).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].url, "http://a.com/");
        assert!(corpus.schema().is_none());
    }

    #[test]
    fn test_directory_shards_and_schema() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "part-00000.jsonl", "{\"url\": \"http://a.com/\"}\n\n");
        write(dir.path(), "part-00001.ndjson", "{\"url\": \"http://b.com/\"}\n");
        write(dir.path(), "notes.txt", "not a shard");
        write(
            dir.path(),
            SCHEMA_FILE,
            &serde_json::to_string(&vec![external_links_field()]).unwrap(),
        );

        let corpus = Corpus::from_paths(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(corpus.files().len(), 2);
        assert_eq!(corpus.schema(), Some(&[external_links_field()][..]));
        assert_eq!(collect(&corpus).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_error_names_file_and_line() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "docs.jsonl",
            "{\"url\": \"http://a.com/\"}\n{\"url\": \n",
        );

        let corpus = Corpus::from_paths(&[path]).unwrap();

        match collect(&corpus) {
            Err(ExtractError::ParseError(msg)) => assert!(msg.contains("docs.jsonl:2")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_line_number_past_first_batch() {
        let dir = TempDir::new().unwrap();
        let mut contents = numbered_corpus(READ_BATCH_LINES + 500);
        contents.push_str("not json\n");
        let path = write(dir.path(), "docs.jsonl", &contents);

        let corpus = Corpus::from_paths(&[path]).unwrap();

        match collect(&corpus) {
            Err(ExtractError::ParseError(msg)) => {
                assert!(msg.contains(&format!("docs.jsonl:{}", READ_BATCH_LINES + 501)))
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_single_shard_is_read_by_many_workers() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "part-00000.jsonl", &numbered_corpus(4 * READ_BATCH_LINES));
        let corpus = Corpus::from_paths(&[path]).unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

        let workers: HashSet<usize> = pool.install(|| {
            corpus
                .documents()
                .map(|document| {
                    document.unwrap();
                    thread::sleep(Duration::from_micros(200));
                    rayon::current_thread_index().unwrap()
                })
                .collect()
        });

        assert!(workers.len() > 1);
        assert_eq!(corpus.documents().count(), 4 * READ_BATCH_LINES);
    }

    #[test]
    fn test_missing_input_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = Corpus::from_paths(&[dir.path().join("missing.jsonl")]);

        assert!(matches!(result, Err(GraphError::Config(_))));
    }

    #[test]
    fn test_empty_directory_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = Corpus::from_paths(&[dir.path().to_path_buf()]);

        assert!(matches!(result, Err(GraphError::Config(_))));
    }

    #[test]
    fn test_progress_callback_counts_documents() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let docs = (0..10).map(|i| Document::new(format!("http://d{}.com/", i))).collect();
        let corpus = Corpus::from_documents(docs).with_progress(Arc::new(move |n| {
            seen.fetch_max(n, Ordering::Relaxed);
        }));

        assert_eq!(corpus.documents().count(), 10);
        assert_eq!(count.load(Ordering::Relaxed), 10);
    }
}
