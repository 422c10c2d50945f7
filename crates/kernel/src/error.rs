use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("invalid path `{path}`: {reason}")]
    Path { path: String, reason: String },

    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    Type {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("schema violation at `{path}`: {reason}")]
    Validation { path: String, reason: String },
}

impl KernelError {
    pub fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        KernelError::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        KernelError::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;
