//! Repository error taxonomy.

use crate::model::ValidationError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure surfaced by repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// No signed-in principal; every operation requires one.
    NotAuthenticated,
    Validation(ValidationError),
    /// Id is not present in the local collection.
    NotFound(String),
    /// Id still belongs to an unconfirmed create.
    PendingCreate(String),
    Remote(StoreError),
    InvalidData(String),
}

impl RepoError {
    /// Human-readable text for transient UI notifications.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please sign in again.".to_string(),
            Self::Validation(err) => format!("Please check your input: {err}."),
            Self::NotFound(_) => "This item no longer exists.".to_string(),
            Self::PendingCreate(_) => "Please wait until the item finishes saving.".to_string(),
            Self::Remote(_) | Self::InvalidData(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Stable machine-readable code for logs and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::Validation(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::PendingCreate(_) => "pending_create",
            Self::Remote(_) => "remote_failed",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "no authenticated principal"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::PendingCreate(id) => write!(f, "item is still being created: {id}"),
            Self::Remote(err) => write!(f, "remote operation failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid remote data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Remote(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}
