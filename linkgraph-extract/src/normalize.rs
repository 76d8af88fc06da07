use crate::error::{ExtractError, Result};
use url::Url;

/// Maps a URL or href to the normalized domain it belongs to.
///
/// Implementations must be pure: the same input always yields the same
/// domain. Malformed input is reported as an error, never a panic.
pub trait DomainNormalizer: Send + Sync {
    fn normalize(&self, url: &str) -> Result<String>;
}

/// Normalizer backed by the WHATWG URL parser.
///
/// Hosts are lowercased by the parser; a trailing root dot and a leading
/// `www.` label are removed.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    strip_www: bool,
}

impl UrlNormalizer {
    pub fn new() -> Self {
        Self { strip_www: true }
    }

    pub fn with_strip_www(mut self, strip_www: bool) -> Self {
        self.strip_www = strip_www;
        self
    }
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainNormalizer for UrlNormalizer {
    fn normalize(&self, url: &str) -> Result<String> {
        let parsed = parse_lenient(url.trim())?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ExtractError::UnsupportedScheme {
                scheme: parsed.scheme().to_string(),
                url: url.to_string(),
            });
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ExtractError::MissingHost(url.to_string()))?
            .trim_end_matches('.');

        let domain = match host.strip_prefix("www.") {
            Some(rest) if self.strip_www && !rest.is_empty() => rest,
            _ => host,
        };

        if domain.is_empty() {
            return Err(ExtractError::MissingHost(url.to_string()));
        }

        Ok(domain.to_string())
    }
}

/// Parse an href the way hosts are written in link records: absolute URLs
/// as-is, protocol-relative and bare hosts with an `http` scheme added.
fn parse_lenient(input: &str) -> Result<Url> {
    if input.is_empty() {
        return Err(ExtractError::InvalidUrl("empty href".to_string()));
    }

    if input.starts_with("//") {
        return Url::parse(&format!("http:{}", input))
            .map_err(|e| ExtractError::InvalidUrl(format!("{}: {}", input, e)));
    }

    // Relative references cannot name a domain
    if input.starts_with(['#', '/', '.', '?']) {
        return Err(ExtractError::InvalidUrl(format!("relative href {}", input)));
    }

    match Url::parse(input) {
        // `example.com:8080/x` parses with `example.com` as its scheme
        Ok(url) if url.has_host() || !url.scheme().contains('.') => Ok(url),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{}", input))
                .map_err(|e| ExtractError::InvalidUrl(format!("{}: {}", input, e)))
        }
        Err(e) => Err(ExtractError::InvalidUrl(format!("{}: {}", input, e))),
    }
}
