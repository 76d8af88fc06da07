use crate::error::{ExtractError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// One outbound hyperlink of a document, as recorded at index time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalLink {
    pub href: String,
}

impl ExternalLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// A crawled document: its own URL and the hrefs of its outbound links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub external_links: Vec<ExternalLink>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            external_links: Vec::new(),
        }
    }

    pub fn with_links<I, S>(url: impl Into<String>, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            external_links: hrefs.into_iter().map(ExternalLink::new).collect(),
        }
    }

    /// Parse a single JSON-lines record.
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| ExtractError::ParseError(e.to_string()))
    }

    pub fn hrefs(&self) -> impl Iterator<Item = &str> {
        self.external_links.iter().map(|link| link.href.as_str())
    }
}

// `external_links` is nullable in the indexed record schema
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ExternalLink>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<ExternalLink>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
