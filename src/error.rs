use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that stop a job array submission
///
/// Command level failures never show up here, they are collapsed into a `bool` by
/// [`crate::shell::command::Execute::execute`]. Only the submitter escalates a failed
/// environment check into [`JobArrayError::Environment`].
#[derive(Error, Debug)]
pub enum JobArrayError {
    #[error("invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("job already sets its own output location: {0}")]
    OutputFlag(String),

    #[error("can't open script template {}: {source}", path.display())]
    TemplateNotFound { path: PathBuf, source: io::Error },

    #[error("can't render script template: {0}")]
    Template(String),

    #[error("environment initialisation failed: {0}")]
    Environment(String),

    #[error("submission aborted by user")]
    UserAbort,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JobArrayError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        JobArrayError::Validation { field, reason: reason.into() }
    }
}
