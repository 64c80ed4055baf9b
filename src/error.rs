//! Error taxonomy shared by the fetch, parse, reconcile and store layers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a response (connection, timeout, body read).
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The source answered, but not with a success status.
    #[error("failed to fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The expected data table was present but had no data rows.
    #[error("no {table} found for {subject}")]
    NoDataFound { table: &'static str, subject: String },

    /// A key field did not have the shape the page layout promises.
    #[error("malformed {field} in row key: {value:?}")]
    MalformedKey { field: &'static str, value: String },

    #[error("no instructor marker \"(P)\" in {text:?}")]
    InstructorParse { text: String },

    #[error("{term:?} is not a valid term")]
    InvalidTerm { term: String },

    #[error("{0:?} is not a course code, instructor id or instructor name")]
    InvalidTarget(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("web cache error: {0}")]
    Cache(String),

    #[error("sqlite error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is the failure of a fetch (as opposed to a parse or store error).
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch { .. } | Error::HttpStatus { .. })
    }
}
