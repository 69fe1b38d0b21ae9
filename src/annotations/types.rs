//! Annotation record types.
//!
//! An annotation anchors a comment thread to a range of text inside rendered
//! HTML. The anchor is described by a short prefix, the exact selected text
//! (`body`) and a container element descriptor that scopes where the text is
//! searched for. Records are stored as a JSON array; wire names are camelCase
//! for compatibility with existing data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A comment thread anchored to a text range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Unique identifier within an annotation set.
    pub id: String,
    /// Text immediately preceding `body`, used to disambiguate near-duplicate
    /// body text. May be empty.
    #[serde(default)]
    pub pre: String,
    /// The exact text that was selected and must be re-located.
    pub body: String,
    /// Tag name of the element that scopes matching for this annotation.
    pub container: String,
    /// Further constraints on the container element.
    #[serde(rename = "containerAttribs", default)]
    pub container_attribs: ContainerAttribs,
    /// Number of additional successful body matches to discard before
    /// accepting one. Older records lack the field.
    #[serde(rename = "skipCount", default)]
    pub skip_count: u32,
    /// The comment thread. Never empty for a valid record.
    pub comments: Vec<Comment>,
}

/// Constraints a container element must satisfy for matching to begin there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerAttribs {
    /// Required `id` attribute. Absent matches an element without an id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Required class set, compared order-independently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<Vec<String>>,
}

/// A single comment in a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Username of the comment author.
    pub author: String,
    /// The comment text, plain text with newlines.
    pub comment: String,
    /// When the comment was made. Older records lack the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the comment has been edited since it was made.
    #[serde(default)]
    pub edited: bool,
}

/// Validation errors for annotation records.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("annotation has an empty id")]
    EmptyId,

    #[error("annotation {0}: body must not be empty")]
    EmptyBody(String),

    #[error("annotation {0}: container must not be empty")]
    EmptyContainer(String),

    #[error("annotation {0}: comment thread must not be empty")]
    NoComments(String),

    #[error("annotation {0}: comment {1} has an empty author")]
    EmptyAuthor(String, usize),
}

impl Comment {
    /// Create a new comment stamped with the current time.
    pub fn new(author: &str, comment: &str) -> Self {
        Self {
            author: author.to_string(),
            comment: comment.to_string(),
            timestamp: Some(Utc::now()),
            edited: false,
        }
    }
}

impl Annotation {
    /// Create a new annotation with a generated id and a first comment.
    pub fn new(
        container: &str,
        container_attribs: ContainerAttribs,
        pre: &str,
        body: &str,
        comment: Comment,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pre: pre.to_string(),
            body: body.to_string(),
            container: container.to_string(),
            container_attribs,
            skip_count: 0,
            comments: vec![comment],
        }
    }

    /// Set the skip count (which occurrence of the body text to anchor to).
    pub fn with_skip_count(mut self, skip_count: u32) -> Self {
        self.skip_count = skip_count;
        self
    }

    /// The first comment of the thread, if any.
    pub fn first_comment(&self) -> Option<&Comment> {
        self.comments.first()
    }

    /// Check the record is well formed enough to anchor and render.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.body.is_empty() {
            return Err(ValidationError::EmptyBody(self.id.clone()));
        }
        if self.container.is_empty() {
            return Err(ValidationError::EmptyContainer(self.id.clone()));
        }
        if self.comments.is_empty() {
            return Err(ValidationError::NoComments(self.id.clone()));
        }
        for (idx, comment) in self.comments.iter().enumerate() {
            if comment.author.is_empty() {
                return Err(ValidationError::EmptyAuthor(self.id.clone(), idx));
            }
        }
        Ok(())
    }
}
