//! Output assembly: splice highlight wrappers into the original markup and
//! append the aside block.
//!
//! The renderer consumes settled structural events (after the buffer shim)
//! and rebuilds the document bottom-up: each open element gets a frame, text
//! and child markup accumulate in the frame's buffer, and the frame is
//! emitted into its parent when the element closes. Deferring emission to
//! close time is what allows a wrapper that ends inside a child element to be
//! closed *before* the child's open tag and reopened just inside it, keeping
//! every span properly nested.
//!
//! Unhighlighted content is copied from the verbatim raw slices, so a
//! document with no matches comes out byte-identical.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::annotations::{Annotation, Comment};
use crate::html::{class_list, NodeEvent, NodeId};

use super::context::{AsideFilter, RenderContext};
use super::matcher::{AnchorMatcher, HighlightEvent, HighlightKind};
use super::HighlightConfig;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\S+)").unwrap());

/// A wrapper span currently open in the output, and the frame depth its open
/// tag was emitted in. The root is depth zero.
struct OpenWrapper {
    key: usize,
    depth: usize,
}

struct Frame<'a> {
    node: NodeId,
    raw_open: &'a str,
    classes: Vec<String>,
    /// Annotation keys whose wrapper crossed this element's open tag: the
    /// wrapper is closed before `raw_open` and reopened just inside it when
    /// the frame is assembled into its parent.
    carried: Vec<usize>,
    buf: String,
}

pub struct HighlightRenderer<'a, 'c> {
    config: &'c HighlightConfig,
    ctx: &'c RenderContext<'c>,
    filter: &'c dyn AsideFilter,
    root_buf: String,
    /// One frame per open element, innermost last.
    frames: Vec<Frame<'a>>,
    open: Vec<OpenWrapper>,
    asides_done: bool,
}

impl<'a, 'c> HighlightRenderer<'a, 'c> {
    pub fn new(
        config: &'c HighlightConfig,
        ctx: &'c RenderContext<'c>,
        filter: &'c dyn AsideFilter,
    ) -> Self {
        Self {
            config,
            ctx,
            filter,
            root_buf: String::new(),
            frames: Vec::new(),
            open: Vec::new(),
            asides_done: false,
        }
    }

    pub fn on_event(&mut self, ev: NodeEvent<'a>, matcher: &AnchorMatcher<'_>) {
        match ev {
            NodeEvent::Open {
                node,
                attrs,
                raw,
                void,
                ..
            } => {
                if void {
                    self.top_buf().push_str(raw);
                } else {
                    self.frames.push(Frame {
                        node,
                        raw_open: raw,
                        classes: class_list(&attrs),
                        carried: Vec::new(),
                        buf: String::new(),
                    });
                }
            }
            NodeEvent::Text { parent, child, raw } => self.on_text(parent, child, raw, matcher),
            NodeEvent::Close { node, raw, .. } => self.on_close(node, raw, matcher),
            NodeEvent::Raw { raw } => self.top_buf().push_str(raw),
        }
    }

    /// The assembled document. A frame still open here indicates a bug in the
    /// event source; remaining frames are folded in rather than lost.
    pub fn finish(mut self) -> String {
        while let Some(frame) = self.frames.pop() {
            tracing::warn!(node = frame.node, "element still open at end of render");
            let top = self.top_buf();
            top.push_str(frame.raw_open);
            top.push_str(&frame.buf);
        }
        self.root_buf
    }

    fn top_buf(&mut self) -> &mut String {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.buf,
            None => &mut self.root_buf,
        }
    }

    fn on_text(&mut self, parent: NodeId, child: u32, raw: &'a str, matcher: &AnchorMatcher<'_>) {
        let mut events: Vec<HighlightEvent> = matcher
            .events_for(parent)
            .iter()
            .filter(|e| e.child == Some(child))
            .copied()
            .collect();
        if events.is_empty() {
            self.top_buf().push_str(raw);
            return;
        }
        // Ends sort before starts at the same offset so adjacent highlights
        // do not nest.
        events.sort_by_key(|e| (e.offset, matches!(e.kind, HighlightKind::Start)));

        let depth = self.frames.len();
        let config = self.config;
        let span_open = |key: usize| span_open_tag(config, matcher.annotation(key));
        let (rendered, crossings) =
            apply_run_events(raw, &events, &mut self.open, depth, &span_open);
        self.top_buf().push_str(&rendered);
        for (key, from) in crossings {
            for d in from + 1..=depth {
                self.frames[d - 1].carried.push(key);
            }
        }
    }

    fn on_close(&mut self, node: NodeId, raw_close: &'a str, matcher: &AnchorMatcher<'_>) {
        let mut frame = match self.frames.pop() {
            Some(frame) => frame,
            None => {
                tracing::warn!(node, "close event without a matching open");
                self.root_buf.push_str(raw_close);
                return;
            }
        };
        if frame.node != node {
            tracing::warn!(node, frame = frame.node, "close event out of order");
        }

        // A match that continues in a later sibling closes its wrapper at the
        // very end of this element.
        for ev in matcher.events_for(node) {
            if ev.kind == HighlightKind::SiblingEnd {
                frame.buf.push_str("</span>");
                self.open.retain(|w| w.key != ev.key);
            }
        }

        let marker = &self.config.container_marker;
        let append_asides = !self.asides_done
            && frame.classes.iter().any(|c| c == marker)
            && !self
                .frames
                .last()
                .map(|f| f.classes.iter().any(|c| c == marker))
                .unwrap_or(false);

        let mut assembled = String::new();
        for _ in &frame.carried {
            assembled.push_str("</span>");
        }
        assembled.push_str(frame.raw_open);
        for &key in &frame.carried {
            assembled.push_str(&span_open_tag(self.config, matcher.annotation(key)));
        }
        assembled.push_str(&frame.buf);
        assembled.push_str(raw_close);
        if append_asides {
            self.asides_done = true;
            assembled.push_str(&self.render_asides(matcher));
        }
        self.top_buf().push_str(&assembled);
    }

    fn render_asides(&self, matcher: &AnchorMatcher<'_>) -> String {
        let unanchored = matcher.unmatched();
        let skip = self.filter.skip(&unanchored);

        let mut body = String::new();
        for annotation in matcher.annotations() {
            if skip.contains(&annotation.id) {
                continue;
            }
            body.push_str(&self.render_aside(annotation));
        }
        if body.is_empty() {
            return String::new();
        }
        format!(
            "<div id=\"{}-annotations\">{}</div>",
            self.config.class_prefix, body
        )
    }

    fn render_aside(&self, annotation: &Annotation) -> String {
        let mut out = format!(
            "<aside id=\"{p}-aside-{id}\" class=\"{p}-aside\"><div class=\"{p}-text\">",
            p = self.config.class_prefix,
            id = html_escape::encode_double_quoted_attribute(&annotation.id),
        );
        for comment in &annotation.comments {
            out.push_str(&self.render_comment(comment));
        }
        out.push_str("</div></aside>");
        out
    }

    fn render_comment(&self, comment: &Comment) -> String {
        let p = &self.config.class_prefix;
        let mut out = format!(
            "<div class=\"{p}-comment\"><div><p>{text}</p><div class=\"{p}-author\">{author}",
            p = p,
            text = self.render_comment_text(&comment.comment),
            author = self.render_author(&comment.author),
        );
        if let Some(ts) = comment.timestamp {
            out.push_str(&format!(" {}", ts.format("%H:%M, %-d %B %Y")));
        }
        if comment.edited {
            out.push_str(&format!(" <span class=\"{}-edited\">(edited)</span>", p));
        }
        out.push_str("</div></div>");
        if self.ctx.can_edit(&comment.author) {
            out.push_str(&format!(
                "<button class=\"{}-editlink\" title=\"Edit\">\u{1f589}</button>",
                p
            ));
        }
        out.push_str("</div>");
        out
    }

    /// Author attribution: linked display name when a profile resolves, the
    /// bare username otherwise, a placeholder for hidden users.
    fn render_author(&self, username: &str) -> String {
        match self.ctx.profiles.lookup(username) {
            Some(profile) if profile.hidden => format!(
                "<span class=\"{}-author-hidden\">[hidden]</span>",
                self.config.class_prefix
            ),
            Some(profile) => {
                let name = profile.display.unwrap_or_else(|| username.to_string());
                match profile.href {
                    Some(href) => format!(
                        "<a href=\"{}\">{}</a>",
                        html_escape::encode_double_quoted_attribute(&href),
                        html_escape::encode_text(&name),
                    ),
                    None => html_escape::encode_text(&name).into_owned(),
                }
            }
            None => html_escape::encode_text(username).into_owned(),
        }
    }

    /// Escape comment text, link known @mentions, turn newlines into breaks.
    fn render_comment_text(&self, text: &str) -> String {
        let mut out = String::new();
        let mut last = 0;
        for caps in MENTION.captures_iter(text) {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            out.push_str(&html_escape::encode_text(&text[last..whole.start()]));
            let username = &caps[1];
            let linked = self
                .ctx
                .profiles
                .lookup(username)
                .filter(|p| !p.hidden)
                .and_then(|p| {
                    let name = p.display.clone().unwrap_or_else(|| username.to_string());
                    p.href.map(|href| (href, name))
                });
            match linked {
                Some((href, name)) => {
                    out.push_str(&format!(
                        "@<a href=\"{}\">{}</a>",
                        html_escape::encode_double_quoted_attribute(&href),
                        html_escape::encode_text(&name),
                    ));
                }
                None => out.push_str(&html_escape::encode_text(whole.as_str())),
            }
            last = whole.end();
        }
        out.push_str(&html_escape::encode_text(&text[last..]));
        out.replace('\n', "<br>")
    }
}

/// The wrapper span for one annotation.
fn span_open_tag(config: &HighlightConfig, annotation: &Annotation) -> String {
    let title = annotation
        .first_comment()
        .map(|c| c.comment.as_str())
        .unwrap_or("");
    format!(
        "<span class=\"{p}-highlight {p}-highlight-{id}\" title=\"{title}\" {attr}=\"{id}\">",
        p = config.class_prefix,
        id = html_escape::encode_double_quoted_attribute(&annotation.id),
        title = html_escape::encode_double_quoted_attribute(title),
        attr = config.id_attribute,
    )
}

/// Splice one text run's highlight boundaries into its raw bytes.
///
/// `open` is the live wrapper stack. An `End` closes every wrapper above its
/// target and reopens the survivors in order, so output spans never cross.
/// Returns the rendered run plus the wrappers whose close landed in a deeper
/// frame than their open (outermost first); the caller records those on the
/// frames in between so their open tags get closed around at assembly.
fn apply_run_events(
    raw: &str,
    events: &[HighlightEvent],
    open: &mut Vec<OpenWrapper>,
    depth: usize,
    span_open: &dyn Fn(usize) -> String,
) -> (String, Vec<(usize, usize)>) {
    let mut out = String::new();
    let mut crossings = Vec::new();
    let mut pos = 0;
    for ev in events {
        if ev.offset > pos {
            out.push_str(&raw[pos..ev.offset]);
            pos = ev.offset;
        }
        match ev.kind {
            HighlightKind::Start => {
                out.push_str(&span_open(ev.key));
                open.push(OpenWrapper { key: ev.key, depth });
            }
            HighlightKind::End => match open.iter().rposition(|w| w.key == ev.key) {
                Some(found) => {
                    let popped: Vec<OpenWrapper> = open.drain(found..).collect();
                    for _ in &popped {
                        out.push_str("</span>");
                    }
                    for w in &popped {
                        if w.depth < depth {
                            crossings.push((w.key, w.depth));
                        }
                    }
                    for w in popped.iter().skip(1) {
                        out.push_str(&span_open(w.key));
                        open.push(OpenWrapper { key: w.key, depth });
                    }
                }
                None => {
                    tracing::warn!(key = ev.key, "highlight end without a matching start");
                    out.push_str("</span>");
                }
            },
            // SiblingEnd binds to the element close, not to a text run.
            HighlightKind::SiblingEnd => {}
        }
    }
    out.push_str(&raw[pos..]);
    (out, crossings)
}
