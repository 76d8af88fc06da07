use crate::error::StoreError;
use crate::model::{DomainEdge, IdEdge};
use crate::store::{DomainIdStore, StoreResult};
use linkgraph_extract::DocumentDomains;
use std::collections::BTreeSet;

/// Candidate edges of one document, one per destination domain. Links to
/// the document's own domain are kept.
pub fn domain_edges(domains: &DocumentDomains) -> impl Iterator<Item = DomainEdge> + '_ {
    domains
        .destinations
        .iter()
        .map(|dst| DomainEdge::new(domains.record_domain.clone(), dst.clone()))
}

/// Candidate identifier edges of one document.
///
/// Destinations are resolved with a single batched lookup. Edges whose
/// destination id equals the record id are dropped, so a self-loop is
/// decided on identifiers rather than on domain strings.
pub fn id_edges(domains: &DocumentDomains, store: &dyn DomainIdStore) -> StoreResult<Vec<IdEdge>> {
    let record_id = store.get_domain_id(&domains.record_domain)?;

    if domains.destinations.is_empty() {
        return Ok(Vec::new());
    }

    let destinations: Vec<&str> = domains.destinations.iter().map(String::as_str).collect();
    let ids = store.get_domain_ids(&destinations)?;
    if ids.len() != destinations.len() {
        return Err(StoreError::BatchMismatch {
            requested: destinations.len(),
            returned: ids.len(),
        });
    }

    let distinct: BTreeSet<_> = ids.into_iter().filter(|id| *id != record_id).collect();
    Ok(distinct
        .into_iter()
        .map(|dst| IdEdge::new(record_id, dst))
        .collect())
}
