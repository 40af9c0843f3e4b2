use thiserror::Error;

use crate::tickets::lifecycle::LifecycleError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("platform request failed: {0}")]
    Transport(String),
}

/// Coarse classification that decides how a failure is surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    Parse,
    ConfigurationMissing,
    Unexpected,
}

impl ErrorClass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Parse => "parse_error",
            Self::ConfigurationMissing => "configuration_missing",
            Self::Unexpected => "unexpected",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("could not parse creator id from topic `{topic}`: {reason}")]
    TopicParse { topic: String, reason: String },
    #[error("role `{0}` does not exist in this guild")]
    RoleMissing(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl TicketError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Directory(DirectoryError::NotFound(_)) => ErrorClass::NotFound,
            Self::Directory(DirectoryError::Forbidden(_)) => ErrorClass::Forbidden,
            Self::Directory(DirectoryError::Transport(_)) => ErrorClass::Unexpected,
            Self::TopicParse { .. } => ErrorClass::Parse,
            Self::RoleMissing(_) => ErrorClass::ConfigurationMissing,
            Self::Lifecycle(_) => ErrorClass::Unexpected,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}
