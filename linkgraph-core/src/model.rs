use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier assigned to a domain by the identifier store.
pub type DomainId = i64;

/// Weight of every identifier edge. Link frequency is not counted.
pub const EDGE_WEIGHT: f64 = 1.0;

/// A directed link between two normalized domains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainEdge {
    pub src: String,
    pub dst: String,
}

impl DomainEdge {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Adjacency-pair line format: `"<src> <dst>"`.
impl fmt::Display for DomainEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.src, self.dst)
    }
}

/// A directed link between two domain identifiers. Never a self-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdEdge {
    pub src: DomainId,
    pub dst: DomainId,
}

impl IdEdge {
    pub fn new(src: DomainId, dst: DomainId) -> Self {
        Self { src, dst }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vertex {
    pub id: DomainId,
    pub domain: String,
}

impl Vertex {
    pub fn new(id: DomainId, domain: impl Into<String>) -> Self {
        Self {
            id,
            domain: domain.into(),
        }
    }
}
