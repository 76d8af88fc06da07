pub mod document;
pub mod error;
pub mod extractor;
pub mod normalize;

pub use document::{Document, ExternalLink};
pub use error::ExtractError;
pub use extractor::{DocumentDomains, LinkExtractor};
pub use normalize::{DomainNormalizer, UrlNormalizer};
