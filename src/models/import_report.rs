//! Bulk import report models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::book::Book;

/// Record that stopped a bulk import.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ImportFailure {
    /// Zero-based position of the record in the upload.
    pub index: usize,
    pub title: String,
    pub message: String,
}

/// Outcome of a bulk import. Books created before a failure stay persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub imported: Vec<Book>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ImportFailure>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}
