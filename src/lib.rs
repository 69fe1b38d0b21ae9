//! Inline annotations for rendered HTML.
//!
//! An annotation records a selected text range as a prefix/body/container
//! triple plus a comment thread. Because documents get re-rendered, stored
//! byte offsets would rot; instead the text is re-anchored on every render
//! by scanning the document once and matching the stored strings against its
//! decoded character data. Matches become `<span>` highlight wrappers spliced
//! into the original markup, and the comment threads render as an aside block
//! after the content container.
//!
//! # Modules
//!
//! - [`annotations`]: annotation records, validation, set operations and
//!   JSON persistence format.
//! - [`html`]: lossless tree-event scanner and entity-decoding text cursor.
//! - [`marker`]: the re-anchoring matcher and highlight renderer.
//!
//! # Example
//!
//! ```
//! use marginalia::{
//!     Annotation, AnnotationMarker, Comment, ContainerAttribs, HighlightConfig,
//!     RenderContext, ShowAll,
//! };
//!
//! let annotation = Annotation::new(
//!     "p",
//!     ContainerAttribs::default(),
//!     "This is ",
//!     "the first paragraph",
//!     Comment::new("alice", "nice opener"),
//! );
//! let marker = AnnotationMarker::new(HighlightConfig::default());
//! let markup = marker
//!     .mark_up(
//!         "<div class=\"mn-content\"><p>This is the first paragraph.</p></div>",
//!         &[annotation],
//!         &RenderContext::anonymous(),
//!         &ShowAll,
//!     )
//!     .unwrap();
//! assert!(markup.html.contains("mn-highlight"));
//! ```

pub mod annotations;
pub mod html;
pub mod marker;

pub use annotations::{
    Annotation, AnnotationSet, Comment, ContainerAttribs, StoreError, ValidationError,
};
pub use marker::{
    AnnotationMarker, AsideFilter, HideUnanchored, HighlightConfig, Markup, MarkupError,
    NoProfiles, Profile, ProfileDirectory, RenderContext, ShowAll,
};
