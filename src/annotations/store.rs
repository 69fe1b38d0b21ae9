//! Annotation set storage operations.
//!
//! An [`AnnotationSet`] is the unit of persistence: the full list of
//! annotations attached to one document, serialized as a JSON array. All
//! operations are copy-on-write: they return a new set and never mutate in
//! place, so a caller can swap the stored document atomically.

use chrono::Utc;
use thiserror::Error;

use super::types::{Annotation, Comment, ValidationError};

/// Errors from annotation set operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no annotation with id {0}")]
    NoSuchAnnotation(String),

    #[error("annotation {0} has no comment at index {1}")]
    NoSuchComment(String, usize),

    #[error("annotation id collision: {0}")]
    IdCollision(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("malformed annotation JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The full set of annotations attached to one document.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    annotations: Vec<Annotation>,
}

impl AnnotationSet {
    /// Build a set from already-parsed records, validating each and checking
    /// id uniqueness.
    pub fn new(annotations: Vec<Annotation>) -> Result<Self, StoreError> {
        for (idx, annotation) in annotations.iter().enumerate() {
            annotation.validate()?;
            if annotations[..idx].iter().any(|a| a.id == annotation.id) {
                return Err(StoreError::IdCollision(annotation.id.clone()));
            }
        }
        Ok(Self { annotations })
    }

    /// Parse a stored JSON array.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let annotations: Vec<Annotation> = serde_json::from_str(json)?;
        Self::new(annotations)
    }

    /// Serialize back to the stored JSON form.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.annotations)?)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn has(&self, id: &str) -> bool {
        self.annotations.iter().any(|a| a.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// A new set with one more annotation.
    pub fn with_added(&self, annotation: Annotation) -> Result<Self, StoreError> {
        annotation.validate()?;
        if self.has(&annotation.id) {
            return Err(StoreError::IdCollision(annotation.id));
        }
        let mut annotations = self.annotations.clone();
        annotations.push(annotation);
        Ok(Self { annotations })
    }

    /// A new set with the given annotation (and its whole thread) removed.
    pub fn without(&self, id: &str) -> Result<Self, StoreError> {
        if !self.has(id) {
            return Err(StoreError::NoSuchAnnotation(id.to_string()));
        }
        let annotations = self
            .annotations
            .iter()
            .filter(|a| a.id != id)
            .cloned()
            .collect();
        Ok(Self { annotations })
    }

    /// A new set with a reply appended to an existing thread.
    pub fn with_reply(&self, id: &str, reply: Comment) -> Result<Self, StoreError> {
        let mut annotations = self.annotations.clone();
        let annotation = annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NoSuchAnnotation(id.to_string()))?;
        annotation.comments.push(reply);
        Ok(Self { annotations })
    }

    /// A new set with one comment's text replaced. The comment is marked as
    /// edited and its timestamp refreshed.
    pub fn with_edited_comment(
        &self,
        id: &str,
        comment_idx: usize,
        text: &str,
    ) -> Result<Self, StoreError> {
        let mut annotations = self.annotations.clone();
        let annotation = annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NoSuchAnnotation(id.to_string()))?;
        let comment = annotation
            .comments
            .get_mut(comment_idx)
            .ok_or_else(|| StoreError::NoSuchComment(id.to_string(), comment_idx))?;
        comment.comment = text.to_string();
        comment.timestamp = Some(Utc::now());
        comment.edited = true;
        Ok(Self { annotations })
    }

    /// Author of an existing comment, for permission checks.
    pub fn comment_author(&self, id: &str, comment_idx: usize) -> Result<&str, StoreError> {
        let annotation = self
            .get(id)
            .ok_or_else(|| StoreError::NoSuchAnnotation(id.to_string()))?;
        annotation
            .comments
            .get(comment_idx)
            .map(|c| c.author.as_str())
            .ok_or_else(|| StoreError::NoSuchComment(id.to_string(), comment_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::types::ContainerAttribs;

    fn annotation(id: &str) -> Annotation {
        let mut a = Annotation::new(
            "p",
            ContainerAttribs::default(),
            "",
            "some text",
            Comment::new("alice", "first!"),
        );
        a.id = id.to_string();
        a
    }

    #[test]
    fn test_add_and_remove() {
        let set = AnnotationSet::default()
            .with_added(annotation("a"))
            .unwrap()
            .with_added(annotation("b"))
            .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.has("a"));

        let pruned = set.without("a").unwrap();
        assert!(!pruned.has("a"));
        assert!(pruned.has("b"));
        // Original untouched.
        assert!(set.has("a"));
    }

    #[test]
    fn test_id_collision_rejected() {
        let set = AnnotationSet::default().with_added(annotation("a")).unwrap();
        assert!(matches!(
            set.with_added(annotation("a")),
            Err(StoreError::IdCollision(_))
        ));
    }

    #[test]
    fn test_remove_missing() {
        let set = AnnotationSet::default();
        assert!(matches!(
            set.without("nope"),
            Err(StoreError::NoSuchAnnotation(_))
        ));
    }

    #[test]
    fn test_reply_appends() {
        let set = AnnotationSet::default().with_added(annotation("a")).unwrap();
        let set = set.with_reply("a", Comment::new("bob", "agreed")).unwrap();
        let thread = &set.get("a").unwrap().comments;
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].author, "bob");
    }

    #[test]
    fn test_edit_marks_edited() {
        let set = AnnotationSet::default().with_added(annotation("a")).unwrap();
        let set = set.with_edited_comment("a", 0, "second thoughts").unwrap();
        let comment = &set.get("a").unwrap().comments[0];
        assert_eq!(comment.comment, "second thoughts");
        assert!(comment.edited);

        assert!(matches!(
            set.with_edited_comment("a", 5, "x"),
            Err(StoreError::NoSuchComment(_, 5))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let set = AnnotationSet::default()
            .with_added(annotation("a"))
            .unwrap()
            .with_added(annotation("b"))
            .unwrap();
        let json = set.to_json().unwrap();
        let parsed = AnnotationSet::from_json(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.comment_author("a", 0).unwrap(), "alice");
    }

    #[test]
    fn test_from_json_rejects_duplicates() {
        let json = r#"[
            {"id":"x","pre":"","body":"t","container":"p",
             "comments":[{"author":"a","comment":"c"}]},
            {"id":"x","pre":"","body":"t","container":"p",
             "comments":[{"author":"a","comment":"c"}]}
        ]"#;
        assert!(matches!(
            AnnotationSet::from_json(json),
            Err(StoreError::IdCollision(_))
        ));
    }
}
