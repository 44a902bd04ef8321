use crate::target::TargetId;
use thiserror::Error;

/// Failures the coordinator reports synchronously to its caller.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("no target with id '{0}'")]
    TargetNotFound(TargetId),
    #[error("target '{0}' is not a sprite")]
    NotASprite(TargetId),
    #[error("no sprite associated with target '{0}'")]
    SpriteMissing(TargetId),
    #[error("no editing target is set")]
    NoEditingTarget,
    #[error("project has no stage target")]
    NoStage,
    #[error("project json could not be parsed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed project: {0}")]
    MalformedProject(String),
    #[error("{0} projects are read-only")]
    ReadOnlyFormat(&'static str),
}

impl VmError {
    pub fn malformed(message: impl Into<String>) -> Self {
        VmError::MalformedProject(message.into())
    }
}

pub type VmResult<T> = Result<T, VmError>;
