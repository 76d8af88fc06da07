use crate::document::Document;
use crate::error::Result;
use crate::normalize::{DomainNormalizer, UrlNormalizer};
use std::collections::BTreeSet;
use tracing::debug;

/// The domains one document contributes to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDomains {
    pub record_domain: String,
    /// Distinct destination domains; may contain `record_domain` itself.
    pub destinations: BTreeSet<String>,
}

impl DocumentDomains {
    /// Every domain this document mentions: its own, then each destination.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.record_domain.as_str())
            .chain(self.destinations.iter().map(String::as_str))
    }

    pub fn into_domains(self) -> impl Iterator<Item = String> {
        std::iter::once(self.record_domain).chain(self.destinations)
    }
}

pub struct LinkExtractor<N = UrlNormalizer> {
    normalizer: N,
}

impl LinkExtractor<UrlNormalizer> {
    pub fn new() -> Self {
        Self::with_normalizer(UrlNormalizer::new())
    }
}

impl Default for LinkExtractor<UrlNormalizer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: DomainNormalizer> LinkExtractor<N> {
    pub fn with_normalizer(normalizer: N) -> Self {
        Self { normalizer }
    }

    /// Derive the record domain and the distinct destination domains of a
    /// document. Hrefs that fail to normalize are skipped; only a malformed
    /// record URL is an error.
    pub fn extract(&self, document: &Document) -> Result<DocumentDomains> {
        let record_domain = self.normalizer.normalize(&document.url)?;

        let mut destinations = BTreeSet::new();
        for href in document.hrefs() {
            match self.normalizer.normalize(href) {
                Ok(domain) => {
                    destinations.insert(domain);
                }
                Err(e) => {
                    debug!("Skipping link {} in {}: {}", href, document.url, e);
                }
            }
        }

        Ok(DocumentDomains {
            record_domain,
            destinations,
        })
    }
}
