//! Annotation records and set operations.
//!
//! An annotation anchors a comment thread to a text range via a
//! prefix/body/container triple (see [`types::Annotation`]). This module owns
//! the record shapes, their validation, and the copy-on-write set operations
//! used by a persistence layer; re-anchoring and rendering live in
//! [`crate::marker`].

mod store;
mod types;

pub use store::{AnnotationSet, StoreError};
pub use types::{Annotation, Comment, ContainerAttribs, ValidationError};
