//! Re-anchoring state machine.
//!
//! The matcher consumes the tree-event stream once and, for every annotation,
//! looks for its prefix followed by its body in the document's decoded text,
//! starting from the first container element that satisfies the annotation's
//! container constraints. Successful matches are recorded as highlight
//! events (start, end, forced sibling end) attached to the element that
//! contains the text run, at raw byte offsets the renderer can splice at.

use std::collections::{BTreeMap, HashMap};
use std::mem;

use crate::annotations::Annotation;
use crate::html::{attr_value, class_list, Attr, DecodedChar, DecodedChars, NodeEvent, NodeId, ROOT};

/// Where an annotation is in its search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No qualifying container seen yet.
    Inactive,
    /// Matching the prefix text.
    Prefix,
    /// Prefix done, matching the body text.
    Body,
    /// An element holding the open highlight closed mid-body; the next
    /// matching character re-opens the highlight in a later sibling.
    SiblingRestart,
    /// Anchored. No further matching.
    Done,
}

/// What a highlight event does to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    /// Open the highlight wrapper at `offset`.
    Start,
    /// Close the highlight wrapper at `offset`.
    End,
    /// Close the highlight wrapper at the end of the element it is attached
    /// to, because the match continues in a later sibling.
    SiblingEnd,
}

/// One highlight boundary, attached to the element containing the text run.
#[derive(Debug, Clone, Copy)]
pub struct HighlightEvent {
    /// Index of the annotation in the input slice.
    pub key: usize,
    /// Byte offset into the raw text run. Zero for `SiblingEnd`.
    pub offset: usize,
    /// Ordinal of the text run among the element's children. `None` for
    /// `SiblingEnd`, which binds to the element itself.
    pub child: Option<u32>,
    pub kind: HighlightKind,
}

struct MatchState {
    phase: Phase,
    pre_pos: usize,
    body_pos: usize,
    skips_left: u32,
    /// Elements this attempt has attached start events to. Used to discard a
    /// false start and to detect when an element holding the open highlight
    /// closes mid-body.
    top_nodes: Vec<NodeId>,
}

/// Single-pass matcher over one document for one annotation list.
pub struct AnchorMatcher<'a> {
    annotations: &'a [Annotation],
    pre: Vec<Vec<char>>,
    body: Vec<Vec<char>>,
    states: Vec<MatchState>,
    events: HashMap<NodeId, Vec<HighlightEvent>>,
}

impl<'a> AnchorMatcher<'a> {
    pub fn new(annotations: &'a [Annotation]) -> Self {
        let pre = annotations.iter().map(|a| a.pre.chars().collect()).collect();
        let body = annotations.iter().map(|a| a.body.chars().collect()).collect();
        let states = annotations
            .iter()
            .map(|a| MatchState {
                phase: Phase::Inactive,
                pre_pos: 0,
                body_pos: 0,
                skips_left: a.skip_count,
                top_nodes: Vec::new(),
            })
            .collect();
        Self {
            annotations,
            pre,
            body,
            states,
            events: HashMap::new(),
        }
    }

    pub fn annotations(&self) -> &'a [Annotation] {
        self.annotations
    }

    pub fn annotation(&self, key: usize) -> &'a Annotation {
        &self.annotations[key]
    }

    /// Feed one structural event through the matcher.
    pub fn on_event(&mut self, ev: &NodeEvent<'_>) {
        match ev {
            NodeEvent::Open { node, name, attrs, .. } => self.on_open(*node, name, attrs),
            NodeEvent::Text { parent, child, raw } => self.on_text(*parent, *child, raw),
            NodeEvent::Close { node, .. } => self.on_close(*node),
            NodeEvent::Raw { .. } => {}
        }
    }

    /// Number of annotations with uncommitted highlight events. While this
    /// is non-zero the output events downstream of the matcher must be held
    /// back, because a later mismatch can retract events already attached.
    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| {
                matches!(s.phase, Phase::Body | Phase::SiblingRestart) && s.skips_left == 0
            })
            .count()
    }

    /// Discard the speculative events of annotations still mid-body. Call
    /// once the stream is exhausted, before the final flush.
    pub fn finish(&mut self) {
        for key in 0..self.states.len() {
            if matches!(self.states[key].phase, Phase::Body | Phase::SiblingRestart) {
                tracing::debug!(
                    id = %self.annotations[key].id,
                    "match still incomplete at end of document, discarding"
                );
                self.discard(key);
                self.states[key].phase = Phase::Prefix;
            }
        }
    }

    /// Anchoring outcome per annotation id: `true` means the anchor text was
    /// not found.
    pub fn unmatched(&self) -> BTreeMap<String, bool> {
        self.annotations
            .iter()
            .zip(&self.states)
            .map(|(a, s)| (a.id.clone(), s.phase != Phase::Done))
            .collect()
    }

    /// Highlight events attached to an element, in emission order.
    pub fn events_for(&self, node: NodeId) -> &[HighlightEvent] {
        self.events.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn on_open(&mut self, _node: NodeId, name: &str, attrs: &[Attr]) {
        for key in 0..self.states.len() {
            if self.states[key].phase == Phase::Inactive && self.qualifies(key, name, attrs) {
                tracing::debug!(id = %self.annotations[key].id, container = name, "activated");
                self.activate(key);
            }
        }
    }

    /// Whether an element satisfies the annotation's container constraints:
    /// same tag name, same id (or both absent), same class set regardless of
    /// order.
    fn qualifies(&self, key: usize, name: &str, attrs: &[Attr]) -> bool {
        let a = &self.annotations[key];
        if !a.container.eq_ignore_ascii_case(name) {
            return false;
        }
        if attr_value(attrs, "id") != a.container_attribs.id.as_deref() {
            return false;
        }
        let mut have = class_list(attrs);
        let mut want = a.container_attribs.class.clone().unwrap_or_default();
        if have.len() != want.len() {
            return false;
        }
        have.sort();
        want.sort();
        have == want
    }

    /// Put an annotation (back) at the start of its search. Scoping gates
    /// activation only, so a reset annotation keeps scanning the rest of the
    /// document rather than waiting for another container.
    fn activate(&mut self, key: usize) {
        let phase = if self.pre[key].is_empty() {
            Phase::Body
        } else {
            Phase::Prefix
        };
        let st = &mut self.states[key];
        st.phase = phase;
        st.pre_pos = 0;
        st.body_pos = 0;
    }

    /// Retract every event this attempt has attached.
    fn discard(&mut self, key: usize) {
        let top_nodes = mem::take(&mut self.states[key].top_nodes);
        for node in top_nodes {
            if let Some(evs) = self.events.get_mut(&node) {
                evs.retain(|e| e.key != key);
            }
        }
    }

    fn on_text(&mut self, parent: NodeId, child: u32, raw: &str) {
        // Text outside any element cannot belong to a container.
        if parent == ROOT {
            return;
        }
        for dc in DecodedChars::new(raw) {
            for key in 0..self.states.len() {
                // A mismatch mid-match resets the annotation; the character
                // that broke the match is then re-tested once against the
                // fresh state.
                if self.step(key, parent, child, dc) {
                    let _ = self.step(key, parent, child, dc);
                }
            }
        }
    }

    /// Advance one annotation by one character. Returns `true` when the
    /// character broke an attempt in progress and should be re-tested.
    fn step(&mut self, key: usize, parent: NodeId, child: u32, dc: DecodedChar) -> bool {
        let phase = self.states[key].phase;
        match phase {
            Phase::Inactive | Phase::Done => false,
            Phase::Prefix => {
                let pos = self.states[key].pre_pos;
                if self.pre[key][pos] == dc.ch {
                    let st = &mut self.states[key];
                    st.pre_pos += 1;
                    if st.pre_pos == self.pre[key].len() {
                        st.phase = Phase::Body;
                        st.body_pos = 0;
                    }
                    false
                } else {
                    self.states[key].pre_pos = 0;
                    pos > 0
                }
            }
            Phase::Body | Phase::SiblingRestart => {
                let pos = self.states[key].body_pos;
                if self.body[key][pos] == dc.ch {
                    if pos == 0 || phase == Phase::SiblingRestart {
                        self.states[key].phase = Phase::Body;
                        if self.states[key].skips_left == 0 {
                            self.push_event(
                                parent,
                                HighlightEvent {
                                    key,
                                    offset: dc.start,
                                    child: Some(child),
                                    kind: HighlightKind::Start,
                                },
                            );
                            self.states[key].top_nodes.push(parent);
                        }
                    }
                    self.states[key].body_pos += 1;
                    if self.states[key].body_pos == self.body[key].len() {
                        if self.states[key].skips_left > 0 {
                            // A skipped occurrence stays spent even if the
                            // accepted one is never found.
                            self.states[key].skips_left -= 1;
                            self.activate(key);
                        } else {
                            self.push_event(
                                parent,
                                HighlightEvent {
                                    key,
                                    offset: dc.end,
                                    child: Some(child),
                                    kind: HighlightKind::End,
                                },
                            );
                            self.states[key].phase = Phase::Done;
                            tracing::debug!(id = %self.annotations[key].id, "anchored");
                        }
                    }
                    false
                } else {
                    let progress = pos > 0 || !self.pre[key].is_empty();
                    self.discard(key);
                    self.activate(key);
                    progress
                }
            }
        }
    }

    fn on_close(&mut self, node: NodeId) {
        for key in 0..self.states.len() {
            let st = &self.states[key];
            if st.phase == Phase::Body
                && st.skips_left == 0
                && st.top_nodes.contains(&node)
            {
                self.push_event(
                    node,
                    HighlightEvent {
                        key,
                        offset: 0,
                        child: None,
                        kind: HighlightKind::SiblingEnd,
                    },
                );
                self.states[key].phase = Phase::SiblingRestart;
            }
        }
    }

    fn push_event(&mut self, node: NodeId, event: HighlightEvent) {
        self.events.entry(node).or_default().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Comment, ContainerAttribs};
    use crate::html::TreeStream;

    fn annotation(pre: &str, body: &str, container: &str) -> Annotation {
        Annotation::new(
            container,
            ContainerAttribs::default(),
            pre,
            body,
            Comment::new("alice", "note"),
        )
    }

    /// Run the matcher over a fragment, returning (matcher, per-node events
    /// flattened as readable strings).
    fn run<'a>(html: &str, annotations: &'a [Annotation]) -> AnchorMatcher<'a> {
        let mut matcher = AnchorMatcher::new(annotations);
        let mut stream = TreeStream::new(html);
        while let Some(ev) = stream.next_event() {
            matcher.on_event(&ev);
        }
        matcher.finish();
        matcher
    }

    fn kinds(matcher: &AnchorMatcher<'_>, node: NodeId) -> Vec<(HighlightKind, usize)> {
        matcher
            .events_for(node)
            .iter()
            .map(|e| (e.kind, e.offset))
            .collect()
    }

    #[test]
    fn test_simple_match_offsets() {
        let mut a = annotation("b", "a", "div");
        a.container_attribs.id = Some("foo".to_string());
        let anns = vec![a];
        let matcher = run("<div id=\"foo\">bar</div>", &anns);
        // The div is node 1.
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 1), (HighlightKind::End, 2)]
        );
        assert_eq!(matcher.unmatched()[&anns[0].id], false);
    }

    #[test]
    fn test_no_qualifying_container_means_no_match() {
        let mut a = annotation("", "bar", "div");
        a.container_attribs = ContainerAttribs {
            id: Some("other".to_string()),
            class: None,
        };
        let anns = vec![a];
        let matcher = run("<div id=\"foo\">bar</div>", &anns);
        assert!(matcher.unmatched()[&anns[0].id]);
        assert!(matcher.events_for(1).is_empty());
    }

    #[test]
    fn test_container_class_set_is_order_independent() {
        let mut a = annotation("", "x", "p");
        a.container_attribs = ContainerAttribs {
            id: None,
            class: Some(vec!["b".to_string(), "a".to_string()]),
        };
        let anns = vec![a];
        let matcher = run("<p class=\"a b\">x</p>", &anns);
        assert_eq!(matcher.unmatched()[&anns[0].id], false);

        let matcher = run("<p class=\"a b c\">x</p>", &anns);
        assert!(matcher.unmatched()[&anns[0].id]);
    }

    #[test]
    fn test_activation_gates_but_does_not_scope() {
        // Qualifying <p> activates; the body is only found in the later
        // <div>. The original system depends on this looseness.
        let anns = vec![annotation("", "target", "p")];
        let matcher = run("<p>nothing</p><div>target</div>", &anns);
        assert_eq!(matcher.unmatched()[&anns[0].id], false);
    }

    #[test]
    fn test_prefix_restart_on_repeated_lead_in() {
        // "ThThis": prefix "Th" matches, 'T' breaks it, and the same 'T'
        // restarts the prefix so the match still lands.
        let anns = vec![annotation("Th", "is", "p")];
        let matcher = run("<p>ThThis</p>", &anns);
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 4), (HighlightKind::End, 6)]
        );
    }

    #[test]
    fn test_body_false_start_is_retracted() {
        // "ababc": body "abc" starts matching at 0, breaks on the second
        // 'a', and re-anchors there.
        let anns = vec![annotation("", "abc", "p")];
        let matcher = run("<p>ababc</p>", &anns);
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 2), (HighlightKind::End, 5)]
        );
    }

    #[test]
    fn test_skip_count_selects_later_occurrence() {
        let anns = vec![annotation("", "ab", "p").with_skip_count(1)];
        let matcher = run("<p>ab ab</p>", &anns);
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 3), (HighlightKind::End, 5)]
        );
    }

    #[test]
    fn test_spent_skip_is_not_restored() {
        let anns = vec![annotation("", "ab", "p").with_skip_count(1)];
        let matcher = run("<p>ab only once</p>", &anns);
        assert!(matcher.unmatched()[&anns[0].id]);
        assert!(matcher.events_for(1).is_empty());
    }

    #[test]
    fn test_sibling_end_on_container_close() {
        // Body spans two paragraphs: the first close forces a sibling end,
        // the remainder re-opens in the second paragraph.
        let anns = vec![annotation("", "one two", "p")];
        let matcher = run("<p>one </p><p>two</p>", &anns);
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 0), (HighlightKind::SiblingEnd, 0)]
        );
        assert_eq!(
            kinds(&matcher, 2),
            vec![(HighlightKind::Start, 0), (HighlightKind::End, 3)]
        );
        assert_eq!(matcher.unmatched()[&anns[0].id], false);
    }

    #[test]
    fn test_end_inside_child_element_attaches_to_child() {
        let anns = vec![annotation("", "is is first", "p")];
        let matcher = run("<p>This is <i>first</i> paragraph</p>", &anns);
        assert_eq!(kinds(&matcher, 1), vec![(HighlightKind::Start, 2)]);
        assert_eq!(kinds(&matcher, 2), vec![(HighlightKind::End, 5)]);
    }

    #[test]
    fn test_entity_boundaries_use_raw_offsets() {
        let anns = vec![annotation("", "a & b", "p")];
        let matcher = run("<p>x a &amp; b y</p>", &anns);
        assert_eq!(
            kinds(&matcher, 1),
            vec![(HighlightKind::Start, 2), (HighlightKind::End, 11)]
        );
    }

    #[test]
    fn test_incomplete_match_discarded_at_end() {
        let anns = vec![annotation("", "never finished", "p")];
        let matcher = run("<p>never fin</p>", &anns);
        assert!(matcher.events_for(1).is_empty());
        assert!(matcher.unmatched()[&anns[0].id]);
    }

    #[test]
    fn test_in_flight_counts_uncommitted_attempts() {
        let anns = vec![annotation("", "abc", "p")];
        let mut matcher = AnchorMatcher::new(&anns);
        let mut stream = TreeStream::new("<p>ab</p>");
        let open = stream.next_event().unwrap();
        matcher.on_event(&open);
        assert_eq!(matcher.in_flight(), 0);
        let text = stream.next_event().unwrap();
        matcher.on_event(&text);
        assert_eq!(matcher.in_flight(), 1);
        matcher.finish();
        assert_eq!(matcher.in_flight(), 0);
    }
}
