use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds carry stable message prefixes; callers match on substrings
/// like `index not found` or `ambiguous link`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vault root does not exist: {0}")]
    VaultNotFound(PathBuf),

    #[error("index not found: {0} (run `mdhop build` first)")]
    IndexNotFound(PathBuf),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file already registered: {0}")]
    FileAlreadyRegistered(String),

    #[error("file not registered: {0}")]
    FileNotRegistered(String),

    #[error("file still exists on disk: {0}")]
    FileStillExists(String),

    #[error("link escapes vault: {raw} in {source_file}")]
    LinkEscapesVault { source_file: String, raw: String },

    #[error("ambiguous link: {raw} in {source_file} (candidates: {})", candidates.join(", "))]
    AmbiguousLink {
        source_file: String,
        raw: String,
        candidates: Vec<String>,
    },

    #[error("adding files would make existing links ambiguous: {0}")]
    AddWouldAmbiguate(String),

    #[error("move would make existing links ambiguous: {raw} in {source_file}")]
    MoveWouldAmbiguate { source_file: String, raw: String },

    #[error("ambiguous link after move: {0}")]
    AmbiguousAfterMove(String),

    #[error("source file is stale: {0} (run `mdhop update` first)")]
    SourceStale(String),

    #[error("moved file is stale: {0} (run `mdhop update` first)")]
    MovedStale(String),

    #[error("source and destination are the same: {0}")]
    SameSourceAndDestination(String),

    #[error("destination already registered: {0}")]
    DestinationRegistered(String),

    #[error("destination already exists on disk: {0}")]
    DestinationExistsOnDisk(String),

    #[error("source file not found on disk: {0}")]
    SourceNotOnDisk(String),

    #[error("path escapes vault: {0}")]
    PathEscapesVault(String),

    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("{0}")]
    Validation(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("config yaml parse error: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
