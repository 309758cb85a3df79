use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("Forward name is empty")]
    EmptyName,

    #[error("Forward \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("Forward \"{0}\" not found")]
    NotFound(String),
}
