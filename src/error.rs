use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EsgfError {
    #[error("invalid variant label: {0}")]
    InvalidMemberId(String),

    #[error("record {id} has no {facet} facet")]
    MissingFacet { id: String, facet: String },

    #[error("esgf data root is not a directory: {0}")]
    InvalidDataRoot(PathBuf),

    #[error("catalog is empty; perform a search first")]
    EmptyCatalog,

    #[error("Solr index request failed: {0}")]
    SolrHttp(String),

    #[error("Solr index returned status {status}: {message}")]
    SolrStatus { status: u16, message: String },

    #[error("Globus index request failed: {0}")]
    GlobusHttp(String),

    #[error("Globus index returned status {status}: {message}")]
    GlobusStatus { status: u16, message: String },

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("no index named {0} in this catalog")]
    UnknownIndex(String),

    #[error("failed to open dataset: {0}")]
    Dataset(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
