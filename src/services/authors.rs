//! Author reconciliation: find-or-create authors by name for a book.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::Author,
    repository::AuthorStore,
};

/// Lookup/insert rounds before giving up on concurrent writers
const MAX_ATTEMPTS: usize = 3;

/// Unique names, first occurrence wins
fn unique_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Names in `wanted` that no author in `found` carries
fn missing_names(wanted: &[String], found: &[Author]) -> Vec<String> {
    let found: HashSet<&str> = found.iter().map(|a| a.name.as_str()).collect();
    wanted
        .iter()
        .filter(|name| !found.contains(name.as_str()))
        .cloned()
        .collect()
}

#[derive(Clone)]
pub struct AuthorReconciler {
    authors: Arc<dyn AuthorStore>,
}

impl AuthorReconciler {
    pub fn new(authors: Arc<dyn AuthorStore>) -> Self {
        Self { authors }
    }

    /// Resolve every name to exactly one author, creating the missing ones.
    ///
    /// The result holds one author per distinct input name, in first
    /// occurrence order. Names created concurrently by another request are
    /// picked up on the next lookup round instead of being duplicated.
    pub async fn reconcile(&self, names: &[String]) -> AppResult<Vec<Author>> {
        let wanted = unique_names(names);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut resolved = self.authors.find_by_names(&wanted).await?;

        for attempt in 1..=MAX_ATTEMPTS {
            let missing = missing_names(&wanted, &resolved);
            if missing.is_empty() {
                break;
            }

            let created = self.authors.insert_missing(&missing).await?;
            let raced = missing.len() - created.len();
            resolved.extend(created);

            if raced > 0 {
                tracing::warn!(
                    "Author reconciliation attempt {}: {} name(s) created concurrently, re-reading",
                    attempt,
                    raced
                );
                let lost = missing_names(&missing, &resolved);
                resolved.extend(self.authors.find_by_names(&lost).await?);
            }
        }

        if !missing_names(&wanted, &resolved).is_empty() {
            return Err(AppError::Internal(
                "Author reconciliation did not converge".to_string(),
            ));
        }

        let position = |author: &Author| wanted.iter().position(|name| *name == author.name);
        resolved.sort_by_key(position);
        resolved.dedup_by(|a, b| a.name == b.name);
        Ok(resolved)
    }
}
