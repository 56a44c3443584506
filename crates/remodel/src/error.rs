use remodel_schema::{ApplyError, MalformedSchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed schema model: {0}")]
    MalformedSchema(#[from] MalformedSchemaError),

    /// An action refers to structure that does not exist where it must.
    #[error("invalid model: {action}: {reason}")]
    InvalidModel { action: String, reason: String },

    /// A cycle that deferring foreign keys cannot break.
    #[error("unresolvable dependency cycle between: {}", actions.join(" | "))]
    UnresolvableCycle { actions: Vec<String> },

    /// Replaying the plan on the old model does not produce the new one.
    #[error("plan does not reproduce the target model:\n{diff}")]
    SimulationMismatch { diff: String },
}

impl From<ApplyError> for Error {
    fn from(err: ApplyError) -> Self {
        let action = match &err {
            ApplyError::TableNotFound { action, .. }
            | ApplyError::TableAlreadyExists { action, .. }
            | ApplyError::TableHasDependents { action, .. }
            | ApplyError::ColumnNotFound { action, .. }
            | ApplyError::ColumnAlreadyExists { action, .. }
            | ApplyError::StorageNameTaken { action, .. }
            | ApplyError::ColumnInUse { action, .. }
            | ApplyError::IndexNotFound { action, .. }
            | ApplyError::IndexAlreadyExists { action, .. }
            | ApplyError::ForeignKeyNotFound { action, .. }
            | ApplyError::ForeignKeyAlreadyExists { action, .. }
            | ApplyError::ForeignKeyTargetNotFound { action, .. }
            | ApplyError::FullTextNotFound { action, .. }
            | ApplyError::FullTextAlreadyExists { action, .. } => action.clone(),
        };
        let rendered = err.to_string();
        let reason = rendered
            .strip_prefix(&format!("{action}: "))
            .unwrap_or(&rendered)
            .to_string();
        Error::InvalidModel { action, reason }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
