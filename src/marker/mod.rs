//! Re-anchor annotations in a rendered document and emit highlighted HTML.
//!
//! The pipeline is a single pass over the document: [`crate::html::TreeStream`]
//! produces structural events, [`matcher::AnchorMatcher`] locates each
//! annotation's text and attaches highlight boundaries to elements,
//! [`buffer::EventBuffer`] holds events back while any match could still be
//! retracted, and [`renderer::HighlightRenderer`] splices the wrapper spans
//! into the original markup and appends the aside block after the content
//! container closes.

mod buffer;
mod context;
mod error;
mod matcher;
mod renderer;

use std::collections::BTreeMap;

use crate::annotations::Annotation;
use crate::html::TreeStream;

use buffer::EventBuffer;
use matcher::AnchorMatcher;
use renderer::HighlightRenderer;

pub use context::{
    AsideFilter, HideUnanchored, NoProfiles, Profile, ProfileDirectory, RenderContext, ShowAll,
};
pub use error::MarkupError;

/// Naming knobs for the generated markup. All emitted ids and classes are
/// derived from `class_prefix`, so multiple annotation layers can coexist on
/// one page.
#[derive(Debug, Clone)]
pub struct HighlightConfig {
    /// Prefix for every generated class and id.
    pub class_prefix: String,
    /// Attribute carrying the annotation id on each highlight span.
    pub id_attribute: String,
    /// Class marking the content container; the aside block is appended
    /// right after the outermost element carrying it.
    pub container_marker: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            class_prefix: "mn".to_string(),
            id_attribute: "data-highlight-id".to_string(),
            container_marker: "mn-content".to_string(),
        }
    }
}

/// Result of marking up one document.
#[derive(Debug)]
pub struct Markup {
    /// The document with highlight spans and the aside block spliced in.
    pub html: String,
    /// Per annotation id: `true` when its anchor text was not found.
    pub unmatched: BTreeMap<String, bool>,
}

/// Anchors annotations in rendered HTML and re-renders with highlights.
#[derive(Debug, Default)]
pub struct AnnotationMarker {
    config: HighlightConfig,
}

impl AnnotationMarker {
    pub fn new(config: HighlightConfig) -> Self {
        Self { config }
    }

    /// Re-anchor `annotations` in `html` and return the highlighted document.
    ///
    /// Documents with no successful match come back byte-identical (modulo
    /// the aside block, which the `filter` controls). Records are validated
    /// up front; matching itself cannot fail.
    pub fn mark_up(
        &self,
        html: &str,
        annotations: &[Annotation],
        ctx: &RenderContext<'_>,
        filter: &dyn AsideFilter,
    ) -> Result<Markup, MarkupError> {
        for (idx, annotation) in annotations.iter().enumerate() {
            annotation.validate()?;
            if annotations[..idx].iter().any(|a| a.id == annotation.id) {
                return Err(MarkupError::DuplicateId(annotation.id.clone()));
            }
        }

        let mut stream = TreeStream::new(html);
        let mut matcher = AnchorMatcher::new(annotations);
        let mut buffer = EventBuffer::new();
        let mut renderer = HighlightRenderer::new(&self.config, ctx, filter);

        while let Some(ev) = stream.next_event() {
            matcher.on_event(&ev);
            buffer.push(ev);
            // Events stay buffered while a match in progress could still
            // retract highlight boundaries it has already attached.
            if matcher.in_flight() == 0 {
                for settled in buffer.flush() {
                    renderer.on_event(settled, &matcher);
                }
            }
        }
        matcher.finish();
        for settled in buffer.flush() {
            renderer.on_event(settled, &matcher);
        }
        debug_assert!(buffer.is_empty());

        let unmatched = matcher.unmatched();
        if unmatched.values().any(|missing| *missing) {
            tracing::debug!(
                total = annotations.len(),
                missing = unmatched.values().filter(|m| **m).count(),
                "some annotations could not be re-anchored"
            );
        }
        Ok(Markup {
            html: renderer.finish(),
            unmatched,
        })
    }
}
