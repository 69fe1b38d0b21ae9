//! Render-time context: who is looking, and which asides to show.

use std::collections::{BTreeMap, BTreeSet};

/// A resolved author profile for aside attribution.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    /// Name to display instead of the raw username.
    pub display: Option<String>,
    /// Link target for the author name.
    pub href: Option<String>,
    /// Hidden authors render as a placeholder instead of a name.
    pub hidden: bool,
}

/// Resolves usernames to display profiles. The renderer falls back to the
/// bare username when a lookup returns `None`.
pub trait ProfileDirectory {
    fn lookup(&self, username: &str) -> Option<Profile>;
}

/// Directory that knows nobody; every author renders as their username.
#[derive(Debug, Default)]
pub struct NoProfiles;

impl ProfileDirectory for NoProfiles {
    fn lookup(&self, _username: &str) -> Option<Profile> {
        None
    }
}

/// Who is viewing the rendered document and what they may do to it.
pub struct RenderContext<'a> {
    /// Username of the viewer, if logged in.
    pub viewer: Option<&'a str>,
    /// Moderators may edit anyone's comments.
    pub can_moderate: bool,
    /// Historical revisions render read-only, with no edit affordances.
    pub historical: bool,
    /// Author profile resolution.
    pub profiles: &'a dyn ProfileDirectory,
}

impl<'a> RenderContext<'a> {
    /// Context for an anonymous, read-only viewer.
    pub fn anonymous() -> Self {
        Self {
            viewer: None,
            can_moderate: false,
            historical: false,
            profiles: &NoProfiles,
        }
    }

    /// Whether the viewer may edit a comment written by `author`.
    pub fn can_edit(&self, author: &str) -> bool {
        if self.historical {
            return false;
        }
        self.can_moderate || self.viewer == Some(author)
    }
}

/// Decides which annotations get an aside in the trailing block. Receives
/// the anchoring outcome so a policy can depend on whether the highlight
/// was actually placed.
pub trait AsideFilter {
    /// Ids of annotations whose asides should be suppressed. Keys of
    /// `unanchored` are all annotation ids; `true` means the anchor text was
    /// not found in this document.
    fn skip(&self, unanchored: &BTreeMap<String, bool>) -> BTreeSet<String>;
}

/// Show an aside for every annotation, anchored or not.
#[derive(Debug, Default)]
pub struct ShowAll;

impl AsideFilter for ShowAll {
    fn skip(&self, _unanchored: &BTreeMap<String, bool>) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Suppress asides for annotations whose anchor text was not found.
#[derive(Debug, Default)]
pub struct HideUnanchored;

impl AsideFilter for HideUnanchored {
    fn skip(&self, unanchored: &BTreeMap<String, bool>) -> BTreeSet<String> {
        unanchored
            .iter()
            .filter(|(_, missing)| **missing)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_cannot_edit() {
        let ctx = RenderContext::anonymous();
        assert!(!ctx.can_edit("alice"));
    }

    #[test]
    fn test_author_can_edit_own_comment() {
        let mut ctx = RenderContext::anonymous();
        ctx.viewer = Some("alice");
        assert!(ctx.can_edit("alice"));
        assert!(!ctx.can_edit("bob"));
    }

    #[test]
    fn test_moderator_can_edit_any_comment() {
        let mut ctx = RenderContext::anonymous();
        ctx.viewer = Some("mod");
        ctx.can_moderate = true;
        assert!(ctx.can_edit("alice"));
    }

    #[test]
    fn test_historical_view_is_read_only() {
        let mut ctx = RenderContext::anonymous();
        ctx.viewer = Some("alice");
        ctx.can_moderate = true;
        ctx.historical = true;
        assert!(!ctx.can_edit("alice"));
    }

    #[test]
    fn test_hide_unanchored_filter() {
        let mut unanchored = BTreeMap::new();
        unanchored.insert("a".to_string(), false);
        unanchored.insert("b".to_string(), true);
        let skipped = HideUnanchored.skip(&unanchored);
        assert!(!skipped.contains("a"));
        assert!(skipped.contains("b"));
        assert!(ShowAll.skip(&unanchored).is_empty());
    }
}
