use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("repository not initialized at {0}")]
    NotInitialized(String),

    #[error("repository already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("no identity configured; set [user] in grove.toml or pass one explicitly")]
    MissingIdentity,

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("branch {0} has no commits yet")]
    NoHead(String),

    #[error("object {id} is a {kind}, expected {expected}")]
    WrongKind {
        id: String,
        kind: String,
        expected: &'static str,
    },

    #[error("cannot proceed with unmerged paths: {}", .0.join(", "))]
    UnmergedState(Vec<String>),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] grove_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] grove_diff::DiffError),

    #[error("history error: {0}")]
    Dag(#[from] grove_dag::DagError),

    #[error("ref error: {0}")]
    Ref(#[from] grove_refs::RefError),

    #[error("index error: {0}")]
    Index(#[from] grove_index::IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for SdkError {
    fn from(e: toml::de::Error) -> Self {
        SdkError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SdkError {
    fn from(e: toml::ser::Error) -> Self {
        SdkError::Config(e.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
