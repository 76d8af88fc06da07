use crate::error::{GraphError, Result, StoreError};
use crate::model::Vertex;
use crate::store::DomainIdStore;
use linkgraph_extract::{Document, ExtractError};
use rayon::prelude::*;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic partition for an item. `DefaultHasher::new()` uses fixed
/// keys, so the same value lands in the same partition on every worker.
pub fn partition_of<T: Hash + ?Sized>(item: &T, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    item.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// A distinct set split into hash partitions.
///
/// Each worker builds its own partial set; partials are combined with
/// [`PartitionedSet::merge`], which is commutative and associative, so the
/// result does not depend on how the input was split between workers.
#[derive(Debug, Clone)]
pub struct PartitionedSet<T> {
    partitions: Vec<HashSet<T>>,
}

impl<T: Hash + Eq> PartitionedSet<T> {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions.max(1)).map(|_| HashSet::new()).collect(),
        }
    }

    pub fn insert(&mut self, item: T) -> bool {
        let idx = partition_of(&item, self.partitions.len());
        self.partitions[idx].insert(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.partitions[partition_of(item, self.partitions.len())].contains(item)
    }

    pub fn merge(mut self, mut other: Self) -> Self {
        debug_assert_eq!(self.partitions.len(), other.partitions.len());

        for (mine, theirs) in self.partitions.iter_mut().zip(other.partitions.iter_mut()) {
            // Fold the smaller set into the larger one
            if mine.len() < theirs.len() {
                std::mem::swap(mine, theirs);
            }
            mine.extend(theirs.drain());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(HashSet::is_empty)
    }

    pub fn partitions(&self) -> &[HashSet<T>] {
        &self.partitions
    }

    pub fn into_partitions(self) -> Vec<HashSet<T>> {
        self.partitions
    }

    pub fn into_vec(self) -> Vec<T> {
        self.partitions.into_iter().flatten().collect()
    }
}

impl<T: Hash + Eq> Extend<T> for PartitionedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

/// Partial distinct edge and vertex-domain sets of one worker.
#[derive(Debug, Clone)]
pub struct Candidates<E> {
    pub edges: PartitionedSet<E>,
    pub vertices: PartitionedSet<String>,
}

impl<E: Hash + Eq> Candidates<E> {
    pub fn new(partitions: usize) -> Self {
        Self {
            edges: PartitionedSet::new(partitions),
            vertices: PartitionedSet::new(partitions),
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            edges: self.edges.merge(other.edges),
            vertices: self.vertices.merge(other.vertices),
        }
    }
}

/// Reduce a parallel document stream to distinct edges and vertex domains.
///
/// `emit` adds the candidates of one document to the worker-local
/// accumulator. Any error aborts the reduction.
pub fn distinct_candidates<I, E, F>(
    documents: I,
    partitions: usize,
    emit: F,
) -> Result<Candidates<E>>
where
    I: ParallelIterator<Item = std::result::Result<Document, ExtractError>>,
    E: Hash + Eq + Send,
    F: Fn(Document, &mut Candidates<E>) -> Result<()> + Sync + Send,
{
    documents
        .try_fold(
            || Candidates::new(partitions),
            |mut acc, document| {
                emit(document?, &mut acc)?;
                Ok::<_, GraphError>(acc)
            },
        )
        .try_reduce(|| Candidates::new(partitions), |a, b| Ok(a.merge(b)))
}

/// Assign ids to the distinct vertex domains, `batch_size` domains per store
/// round trip.
pub fn resolve_vertices(
    domains: PartitionedSet<String>,
    store: &dyn DomainIdStore,
    batch_size: usize,
) -> Result<Vec<Vertex>> {
    let domains = domains.into_vec();

    let batches = domains
        .par_chunks(batch_size.max(1))
        .map(|chunk| -> Result<Vec<Vertex>> {
            let names: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let ids = store.get_domain_ids(&names)?;
            if ids.len() != names.len() {
                return Err(GraphError::Store(StoreError::BatchMismatch {
                    requested: names.len(),
                    returned: ids.len(),
                }));
            }
            Ok(chunk
                .iter()
                .zip(ids)
                .map(|(domain, id)| Vertex::new(id, domain.clone()))
                .collect())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(batches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_partitioned_set_deduplicates() {
        let mut set = PartitionedSet::new(4);
        assert!(set.insert("a"));
        assert!(set.insert("b"));
        assert!(!set.insert("a"));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&"b"));
    }

    #[test]
    fn test_partition_is_stable() {
        for item in ["a.com", "b.com", "c.com"] {
            assert_eq!(partition_of(item, 8), partition_of(item, 8));
            assert!(partition_of(item, 8) < 8);
        }
        assert_eq!(partition_of("anything", 0), 0);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let build = |items: &[u32]| {
            let mut set = PartitionedSet::new(3);
            set.extend(items.iter().copied());
            set
        };

        let ab = build(&[1, 2, 3]).merge(build(&[3, 4, 5]));
        let ba = build(&[3, 4, 5]).merge(build(&[1, 2, 3]));

        let mut left = ab.into_vec();
        let mut right = ba.into_vec();
        left.sort();
        right.sort();
        assert_eq!(left, vec![1, 2, 3, 4, 5]);
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_keeps_items_in_their_partition() {
        let mut a = PartitionedSet::new(5);
        a.extend(0..50u32);
        let mut b = PartitionedSet::new(5);
        b.extend(25..100u32);

        let merged = a.merge(b);

        assert_eq!(merged.len(), 100);
        for (idx, partition) in merged.partitions().iter().enumerate() {
            assert!(partition.iter().all(|item| partition_of(item, 5) == idx));
        }
    }

    #[test]
    fn test_distinct_candidates_across_documents() {
        let docs: Vec<Document> = (0..100)
            .map(|i| {
                Document::with_links(format!("http://site{}.com/", i % 7), ["http://hub.com/"])
            })
            .collect();

        let candidates = distinct_candidates(
            docs.into_par_iter().map(Ok),
            4,
            |doc, acc: &mut Candidates<(String, String)>| {
                acc.edges.insert((doc.url.clone(), "hub".to_string()));
                acc.vertices.insert(doc.url);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(candidates.edges.len(), 7);
        assert_eq!(candidates.vertices.len(), 7);
    }

    #[test]
    fn test_distinct_candidates_propagates_errors() {
        let docs = vec![
            Ok(Document::new("http://a.com/")),
            Err(ExtractError::ParseError("line 2: bad record".to_string())),
        ];

        let result =
            distinct_candidates(docs.into_par_iter(), 2, |_, _: &mut Candidates<u8>| Ok(()));

        assert!(matches!(result, Err(GraphError::Document(_))));
    }

    #[test]
    fn test_resolve_vertices_in_batches() {
        let store = MemoryStore::new();
        let mut domains = PartitionedSet::new(3);
        domains.extend((0..25).map(|i| format!("d{}.com", i)));

        let vertices = resolve_vertices(domains, &store, 4).unwrap();

        assert_eq!(vertices.len(), 25);
        for vertex in &vertices {
            assert_eq!(store.lookup(&vertex.domain).unwrap(), Some(vertex.id));
        }
        let ids: HashSet<_> = vertices.iter().map(|v| v.id).collect();
        assert_eq!(ids.len(), 25);
    }
}
