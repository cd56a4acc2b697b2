use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Upstream model API returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Relay returned {status}: {message}")]
    Relay { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, Error>;
