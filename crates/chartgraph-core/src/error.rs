use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid wall: {0}")]
    InvalidWall(String),
    #[error("Invalid node kind tag: {0}")]
    InvalidKindTag(String),
}
