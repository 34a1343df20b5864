use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveLoadError {
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    #[error("Invalid migration range {from} -> {to}: from must be lower than to")]
    InvalidRange { from: String, to: String },

    #[error("Migration for {component_type} ({from} -> {to}) already registered")]
    DuplicateMigration {
        component_type: String,
        from: String,
        to: String,
    },

    #[error("Migration range for {0} is incomplete: from_version and to_version must be set before adding edits")]
    IncompleteRange(String),

    #[error("[{component_type}] Failed to apply migrations: {cause}")]
    MigrationFailed { component_type: String, cause: String },

    #[error("Type '{0}' not found and no fallback mapping exists")]
    TypeResolutionFailed(String),

    #[error("Failed to decode {type_name}: {cause}")]
    DecodeFailed { type_name: String, cause: String },

    #[error("Failed to encode {type_name}: {cause}")]
    EncodeFailed { type_name: String, cause: String },

    #[error("Post-load hook failed for {type_name}: {cause}")]
    PostLoadFailed { type_name: String, cause: String },

    #[error("Component type '{0}' is already registered")]
    DuplicateComponentType(String),

    #[error("Store I/O error: {0}")]
    StoreIoFailed(String),

    #[error("Save '{0}' has no world snapshot")]
    MissingWorldSnapshot(String),

    #[error("Another save/load operation is already in progress")]
    OperationInProgress,

    #[error("Save/load worker is no longer running")]
    WorkerClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, SaveLoadError>;

impl SaveLoadError {
    /// Errors that abort a whole save or load rather than a single entity.
    pub fn is_operation_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreIoFailed(_) | Self::MissingWorldSnapshot(_) | Self::LockError(_)
        )
    }

    pub(crate) fn store_io(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StoreIoFailed(format!("{}: {}", context, err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for SaveLoadError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
