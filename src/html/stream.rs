//! Lossless HTML fragment tree-event stream.
//!
//! [`TreeStream`] scans a serialized HTML fragment once and yields structural
//! events (element open, text run, element close) without building a DOM.
//! Every event carries the verbatim source slice it came from, so a consumer
//! that concatenates the `raw` fields reproduces the input byte for byte;
//! the highlight renderer relies on this to keep unannotated content
//! untouched.
//!
//! The scanner is tolerant rather than conforming: void elements never open a
//! scope, a close tag pops (and implicitly closes) any unclosed elements above
//! its match, a close tag with no match passes through verbatim, and
//! everything still open at end of input is implicitly closed.

use std::collections::VecDeque;

/// Identifier of a structural node, stable for one stream.
pub type NodeId = u32;

/// The id of the virtual fragment root. Text directly under the root belongs
/// to no element.
pub const ROOT: NodeId = 0;

/// HTML5 void elements: they never have children and never get a close tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "param", "source", "track", "wbr",
];

/// A parsed attribute. The name is lowercased; the value is entity-decoded.
#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

/// One structural event in document order.
#[derive(Debug)]
pub enum NodeEvent<'a> {
    /// An element opens. `void` elements produce no matching `Close`.
    Open {
        node: NodeId,
        name: String,
        attrs: Vec<Attr>,
        raw: &'a str,
        void: bool,
    },
    /// A run of character data. `child` is the run's ordinal among its
    /// parent's children, used to tie highlight events back to the run.
    Text {
        parent: NodeId,
        child: u32,
        raw: &'a str,
    },
    /// An element closes. `raw` is empty when the close is implicit.
    Close {
        node: NodeId,
        name: String,
        raw: &'a str,
    },
    /// Markup passed through untouched: comments, doctype, bogus markup,
    /// close tags with no matching open element.
    Raw { raw: &'a str },
}

/// Look up a decoded attribute value by (lowercase) name.
pub fn attr_value<'e>(attrs: &'e [Attr], name: &str) -> Option<&'e str> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.value.as_deref())
}

/// The element's class attribute split into individual class names.
pub fn class_list(attrs: &[Attr]) -> Vec<String> {
    attr_value(attrs, "class")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

struct OpenElement {
    node: NodeId,
    name: String,
    children: u32,
}

/// Streaming scanner over one HTML fragment.
pub struct TreeStream<'a> {
    input: &'a str,
    pos: usize,
    stack: Vec<OpenElement>,
    root_children: u32,
    next_id: NodeId,
    queue: VecDeque<NodeEvent<'a>>,
}

impl<'a> TreeStream<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            stack: Vec::new(),
            root_children: 0,
            next_id: ROOT + 1,
            queue: VecDeque::new(),
        }
    }

    /// Next structural event, or `None` once the input (and all implicit
    /// closes) are exhausted.
    pub fn next_event(&mut self) -> Option<NodeEvent<'a>> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Some(ev);
            }
            if self.pos >= self.input.len() {
                let elem = self.stack.pop()?;
                return Some(NodeEvent::Close {
                    node: elem.node,
                    name: elem.name,
                    raw: "",
                });
            }
            self.scan();
        }
    }

    fn current_parent(&self) -> NodeId {
        self.stack.last().map(|e| e.node).unwrap_or(ROOT)
    }

    fn bump_child(&mut self) -> u32 {
        match self.stack.last_mut() {
            Some(top) => {
                let idx = top.children;
                top.children += 1;
                idx
            }
            None => {
                let idx = self.root_children;
                self.root_children += 1;
                idx
            }
        }
    }

    fn scan(&mut self) {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        if bytes[start] == b'<' {
            match bytes.get(start + 1) {
                Some(b'!') | Some(b'?') => return self.scan_bogus(),
                Some(b'/') => return self.scan_close_tag(),
                Some(c) if c.is_ascii_alphabetic() => return self.scan_open_tag(),
                _ => {}
            }
        }
        self.scan_text();
    }

    /// True if the byte at `at` begins markup rather than text.
    fn is_tag_start(&self, at: usize) -> bool {
        let bytes = self.input.as_bytes();
        bytes[at] == b'<'
            && match bytes.get(at + 1) {
                Some(b'!') | Some(b'?') | Some(b'/') => true,
                Some(c) => c.is_ascii_alphabetic(),
                None => false,
            }
    }

    fn scan_text(&mut self) {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let mut end = start + 1;
        while end < bytes.len() {
            if bytes[end] == b'<' && self.is_tag_start(end) {
                break;
            }
            end += 1;
        }
        self.pos = end;
        let parent = self.current_parent();
        let child = self.bump_child();
        self.queue.push_back(NodeEvent::Text {
            parent,
            child,
            raw: &self.input[start..end],
        });
    }

    /// Comments, doctype and other `<!`/`<?` markup: pass through verbatim.
    fn scan_bogus(&mut self) {
        let start = self.pos;
        let end = if self.input[start..].starts_with("<!--") {
            match self.input[start + 4..].find("-->") {
                Some(idx) => start + 4 + idx + 3,
                None => self.input.len(),
            }
        } else {
            match self.input[start..].find('>') {
                Some(idx) => start + idx + 1,
                None => self.input.len(),
            }
        };
        self.pos = end;
        self.bump_child();
        self.queue.push_back(NodeEvent::Raw {
            raw: &self.input[start..end],
        });
    }

    fn scan_close_tag(&mut self) {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let mut i = start + 2;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        let name = self.input[start + 2..i].to_ascii_lowercase();
        let end = match self.input[i..].find('>') {
            Some(idx) => i + idx + 1,
            None => {
                // Unterminated close tag at end of input.
                self.pos = self.input.len();
                self.queue.push_back(NodeEvent::Raw {
                    raw: &self.input[start..],
                });
                return;
            }
        };
        self.pos = end;
        let raw = &self.input[start..end];

        match self.stack.iter().rposition(|e| e.name == name) {
            Some(matched) => {
                // Implicitly close anything left open above the match.
                let mut closed = self.stack.split_off(matched);
                let target = closed.remove(0);
                for elem in closed.into_iter().rev() {
                    self.queue.push_back(NodeEvent::Close {
                        node: elem.node,
                        name: elem.name,
                        raw: "",
                    });
                }
                self.queue.push_back(NodeEvent::Close {
                    node: target.node,
                    name: target.name,
                    raw,
                });
            }
            None => {
                // Stray close tag; keep it in the output untouched.
                self.queue.push_back(NodeEvent::Raw { raw });
            }
        }
    }

    fn scan_open_tag(&mut self) {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let mut i = start + 1;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        let name = self.input[start + 1..i].to_ascii_lowercase();

        let mut attrs = Vec::new();
        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                // Unterminated tag; nothing sensible to do but pass it through.
                self.pos = self.input.len();
                self.queue.push_back(NodeEvent::Raw {
                    raw: &self.input[start..],
                });
                return;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    // HTML ignores the slash on non-void elements.
                    i += 1;
                }
                _ => {
                    let (attr, next) = self.scan_attr(i);
                    attrs.push(attr);
                    i = next;
                }
            }
        }
        self.pos = i;
        let raw = &self.input[start..i];
        let void = VOID_ELEMENTS.contains(&name.as_str());

        self.bump_child();
        let node = self.next_id;
        self.next_id += 1;
        self.queue.push_back(NodeEvent::Open {
            node,
            name: name.clone(),
            attrs,
            raw,
            void,
        });
        if !void {
            self.stack.push(OpenElement {
                node,
                name,
                children: 0,
            });
        }
    }

    fn scan_attr(&self, at: usize) -> (Attr, usize) {
        let bytes = self.input.as_bytes();
        let mut i = at;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let name = self.input[at..i].to_ascii_lowercase();

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            return (Attr { name, value: None }, i);
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let (raw_value, end) = if j < bytes.len() && (bytes[j] == b'"' || bytes[j] == b'\'') {
            let quote = bytes[j];
            let vstart = j + 1;
            let mut vend = vstart;
            while vend < bytes.len() && bytes[vend] != quote {
                vend += 1;
            }
            let after = if vend < bytes.len() { vend + 1 } else { vend };
            (&self.input[vstart..vend], after)
        } else {
            let vstart = j;
            let mut vend = vstart;
            while vend < bytes.len()
                && !bytes[vend].is_ascii_whitespace()
                && bytes[vend] != b'>'
            {
                vend += 1;
            }
            (&self.input[vstart..vend], vend)
        };
        let value = html_escape::decode_html_entities(raw_value).into_owned();
        (
            Attr {
                name,
                value: Some(value),
            },
            end,
        )
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<String> {
        let mut stream = TreeStream::new(input);
        let mut out = Vec::new();
        while let Some(ev) = stream.next_event() {
            out.push(match ev {
                NodeEvent::Open { name, void, .. } => {
                    format!("open {}{}", name, if void { " void" } else { "" })
                }
                NodeEvent::Text { parent, child, raw } => {
                    format!("text {}#{} {:?}", parent, child, raw)
                }
                NodeEvent::Close { name, raw, .. } => {
                    format!("close {}{}", name, if raw.is_empty() { " implicit" } else { "" })
                }
                NodeEvent::Raw { raw } => format!("raw {:?}", raw),
            });
        }
        out
    }

    fn reassemble(input: &str) -> String {
        let mut stream = TreeStream::new(input);
        let mut out = String::new();
        while let Some(ev) = stream.next_event() {
            match ev {
                NodeEvent::Open { raw, .. }
                | NodeEvent::Text { raw, .. }
                | NodeEvent::Close { raw, .. }
                | NodeEvent::Raw { raw } => out.push_str(raw),
            }
        }
        out
    }

    #[test]
    fn test_simple_structure() {
        assert_eq!(
            events("<p>hi</p>"),
            vec!["open p", "text 1#0 \"hi\"", "close p"]
        );
    }

    #[test]
    fn test_child_ordinals_count_elements_and_runs() {
        let evs = events("<p>a<b>c</b>d</p>");
        assert!(evs.contains(&"text 1#0 \"a\"".to_string()));
        assert!(evs.contains(&"text 2#0 \"c\"".to_string()));
        assert!(evs.contains(&"text 1#2 \"d\"".to_string()));
    }

    #[test]
    fn test_void_elements_do_not_nest() {
        assert_eq!(
            events("<p>a<br>b</p>"),
            vec![
                "open p",
                "text 1#0 \"a\"",
                "open br void",
                "text 1#2 \"b\"",
                "close p"
            ]
        );
    }

    #[test]
    fn test_outer_close_pops_inner() {
        assert_eq!(
            events("<ul><li>a</ul>"),
            vec![
                "open ul",
                "open li",
                "text 2#0 \"a\"",
                "close li implicit",
                "close ul"
            ]
        );
    }

    #[test]
    fn test_eof_closes_open_elements() {
        assert_eq!(
            events("<div><p>a"),
            vec!["open div", "open p", "text 2#0 \"a\"", "close p implicit", "close div implicit"]
        );
    }

    #[test]
    fn test_stray_close_passes_through() {
        assert_eq!(
            events("a</b>c"),
            vec!["text 0#0 \"a\"", "raw \"</b>\"", "text 0#2 \"c\""]
        );
    }

    #[test]
    fn test_attrs_decoded_and_lowercased() {
        let mut stream = TreeStream::new("<DIV ID=\"x\" class='a &amp; b' hidden>");
        match stream.next_event().unwrap() {
            NodeEvent::Open { name, attrs, .. } => {
                assert_eq!(name, "div");
                assert_eq!(attr_value(&attrs, "id"), Some("x"));
                assert_eq!(attr_value(&attrs, "class"), Some("a & b"));
                assert!(attrs.iter().any(|a| a.name == "hidden" && a.value.is_none()));
                assert_eq!(class_list(&attrs), vec!["a", "&", "b"]);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_and_doctype_pass_through() {
        let evs = events("<!DOCTYPE html><p>a<!-- note -->b</p>");
        assert!(evs.contains(&"raw \"<!DOCTYPE html>\"".to_string()));
        assert!(evs.contains(&"raw \"<!-- note -->\"".to_string()));
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        assert_eq!(events("a < b"), vec!["text 0#0 \"a < b\""]);
    }

    #[test]
    fn test_reassembly_is_lossless() {
        let input = "<!DOCTYPE html><div class=\"c\">a &amp; b<br><i>x</i><!-- c --></div></b><p>tail";
        assert_eq!(reassemble(input), input);
    }
}
