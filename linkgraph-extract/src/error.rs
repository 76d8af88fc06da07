use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("Unsupported scheme '{scheme}' in {url}")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
