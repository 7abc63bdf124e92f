//! Owner-scoped collection addressing.

use super::{StoreError, StoreResult};
use std::fmt::{Display, Formatter};

/// Root collection holding one document per principal.
pub const USERS_COLLECTION: &str = "users";

/// Validated path of a remote collection, e.g. `users/u1/boards/b1/lists`.
///
/// Segments alternate collection and document ids, so a collection path
/// always has an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// Top-level collection.
    pub fn root(collection: &str) -> StoreResult<Self> {
        Self::from_segments(vec![collection.to_string()])
    }

    /// Collection nested under the principal's user document.
    ///
    /// `relative` must alternate collection/document segments and end on a
    /// collection, e.g. `["boards", "b1", "lists"]`.
    pub fn for_user(uid: &str, relative: &[String]) -> StoreResult<Self> {
        let mut segments = Vec::with_capacity(relative.len() + 2);
        segments.push(USERS_COLLECTION.to_string());
        segments.push(uid.to_string());
        segments.extend(relative.iter().cloned());
        Self::from_segments(segments)
    }

    /// Parses a `/`-separated collection path.
    pub fn parse(value: &str) -> StoreResult<Self> {
        Self::from_segments(value.split('/').map(str::to_string).collect())
    }

    /// Sub-collection of one document in this collection.
    pub fn child(&self, doc_id: &str, collection: &str) -> StoreResult<Self> {
        let mut segments = self.segments.clone();
        segments.push(doc_id.to_string());
        segments.push(collection.to_string());
        Self::from_segments(segments)
    }

    /// Last segment (the collection name).
    pub fn collection_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn from_segments(segments: Vec<String>) -> StoreResult<Self> {
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "collection path needs an odd segment count, got `{}`",
                segments.join("/")
            )));
        }
        if let Some(bad) = segments.iter().find(|segment| !is_valid_segment(segment)) {
            return Err(StoreError::InvalidPath(format!(
                "invalid path segment `{bad}` in `{}`",
                segments.join("/")
            )));
        }
        Ok(Self { segments })
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Checks one document id or collection name.
pub fn is_valid_segment(value: &str) -> bool {
    !value.is_empty() && value.trim() == value && !value.contains('/') && value != "." && value != ".."
}

#[cfg(test)]
mod tests {
    use super::CollectionPath;
    use crate::store::StoreError;

    #[test]
    fn builds_user_scoped_paths() {
        let relative = vec!["boards".to_string(), "b1".to_string(), "lists".to_string()];
        let path = CollectionPath::for_user("u1", &relative).unwrap();
        assert_eq!(path.to_string(), "users/u1/boards/b1/lists");
        assert_eq!(path.collection_name(), "lists");
    }

    #[test]
    fn rejects_document_paths_and_bad_segments() {
        assert!(matches!(
            CollectionPath::parse("users/u1"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(CollectionPath::parse("users//boards").is_err());
        assert!(CollectionPath::for_user(" u1", &["boards".to_string()]).is_err());
    }

    #[test]
    fn child_appends_document_and_collection() {
        let boards = CollectionPath::parse("users/u1/boards").unwrap();
        let lists = boards.child("b7", "lists").unwrap();
        assert_eq!(lists, CollectionPath::parse("users/u1/boards/b7/lists").unwrap());
        assert!(boards.child("a/b", "lists").is_err());
    }
}
