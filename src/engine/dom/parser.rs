//! Lenient HTML fragment parser.
//!
//! This is not an HTML5 tree builder. It understands what server-rendered
//! partials actually contain: elements with quoted, unquoted and boolean
//! attributes, void elements, comments, raw text in `<script>`/`<style>`, and the
//! common character references. Malformed input never fails; stray end tags are
//! dropped and unclosed elements are closed at the end of the input. Nesting is
//! capped at [`MAX_DEPTH`] open elements.

use crate::engine::dom::document::{Attribute, Document, Element, NodeId};

pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements opened deeper than this are appended flat to the deepest open
/// element instead of nesting further.
pub(crate) const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Comment(String),
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Set after a raw text start tag: the next token is everything up to `</name`
    raw_text_end: Option<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text_end: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Advances past the next `>` (or to the end).
    fn skip_past_gt(&mut self) {
        match self.rest().find('>') {
            Some(i) => self.pos += i + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn read_raw_text(&mut self, tag: &str) -> Option<Token> {
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        let end = lower.find(&format!("</{}", tag)).unwrap_or(rest.len());
        self.pos += end;
        if end == 0 {
            return None;
        }
        Some(Token::Text(rest[..end].to_string()))
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>' && b != b'/' && b != b'=')
        {
            self.pos += 1;
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn read_attribute_value(&mut self) -> String {
        match self.peek() {
            Some(q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let rest = self.rest();
                let end = rest.find(q as char).unwrap_or(rest.len());
                let value = decode_entities(&rest[..end]);
                self.pos = (self.pos + end + 1).min(self.input.len());
                value
            }
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(|b| !b.is_ascii_whitespace() && b != b'>') {
                    self.pos += 1;
                }
                decode_entities(&self.input[start..self.pos])
            }
        }
    }

    fn read_start_tag(&mut self) -> Token {
        // Past the '<'
        self.pos += 1;
        let name = self.read_name();
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() == Some(b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                Some(b'=') => {
                    // Value without a name, skip it
                    self.pos += 1;
                    self.skip_whitespace();
                    self.read_attribute_value();
                }
                Some(_) => {
                    let attr_name = self.read_name();
                    self.skip_whitespace();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.read_attribute_value()
                    } else {
                        String::new()
                    };
                    // First occurrence wins
                    if !attributes.iter().any(|a| a.name == attr_name) {
                        attributes.push(Attribute {
                            name: attr_name,
                            value,
                        });
                    }
                }
            }
        }

        if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text_end = Some(name.clone());
        }

        Token::StartTag {
            name,
            attributes,
            self_closing,
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(tag) = self.raw_text_end.take() {
            if let Some(text) = self.read_raw_text(&tag) {
                return Some(text);
            }
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }

            if let Some(body) = rest.strip_prefix("<!--") {
                let (comment, consumed) = match body.find("-->") {
                    Some(i) => (&body[..i], 4 + i + 3),
                    None => (body, rest.len()),
                };
                self.pos += consumed;
                return Some(Token::Comment(comment.to_string()));
            }

            let bytes = rest.as_bytes();
            if bytes[0] == b'<' && bytes.len() > 1 {
                match bytes[1] {
                    b'!' | b'?' => {
                        // Doctype, CDATA, processing instructions
                        self.skip_past_gt();
                        continue;
                    }
                    b'/' if bytes.len() > 2 && bytes[2].is_ascii_alphabetic() => {
                        self.pos += 2;
                        let name = self.read_name();
                        self.skip_past_gt();
                        return Some(Token::EndTag { name });
                    }
                    b'/' => {
                        // "</>" or "</ junk>"
                        self.skip_past_gt();
                        continue;
                    }
                    b if b.is_ascii_alphabetic() => return Some(self.read_start_tag()),
                    _ => {}
                }
            }

            // Text up to the next thing that looks like markup
            let mut end = 1;
            while end < bytes.len() {
                if bytes[end] == b'<'
                    && bytes
                        .get(end + 1)
                        .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
                {
                    break;
                }
                end += 1;
            }
            self.pos += end;
            return Some(Token::Text(decode_entities(&rest[..end])));
        }
    }
}

/// Decodes the character references server templates emit.
pub(crate) fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];

        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok()
                    } else {
                        None
                    };
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl Document {
    /// Parses `html` into a new detached fragment and returns the fragment.
    pub fn parse_fragment(&mut self, html: &str) -> NodeId {
        let fragment = self.create_fragment();
        let mut stack = vec![fragment];

        for token in Tokenizer::new(html) {
            let Some(&top) = stack.last() else {
                break;
            };

            match token {
                Token::Text(text) => {
                    let node = self.create_text(&text);
                    let _ = self.append_child(top, node);
                }
                Token::Comment(text) => {
                    let node = self.create_comment(&text);
                    let _ = self.append_child(top, node);
                }
                Token::StartTag {
                    name,
                    attributes,
                    self_closing,
                } => {
                    let is_void = VOID_ELEMENTS.contains(&name.as_str());
                    let node = self.alloc_element(Element {
                        tag: name,
                        attributes,
                    });
                    let _ = self.append_child(top, node);
                    // The stack holds the fragment plus the open elements
                    if !is_void && !self_closing && stack.len() <= MAX_DEPTH {
                        stack.push(node);
                    }
                }
                Token::EndTag { name } => {
                    // Close the nearest open element with this name, ignore strays
                    if let Some(idx) = stack
                        .iter()
                        .rposition(|n| self.tag_name(*n) == Some(name.as_str()))
                    {
                        if idx > 0 {
                            stack.truncate(idx);
                        }
                    }
                }
            }
        }

        fragment
    }

    fn alloc_element(&mut self, element: Element) -> NodeId {
        let id = self.create_element(&element.tag);
        for attr in element.attributes {
            // Freshly created element, cannot be stale
            let _ = self.set_attr(id, &attr.name, &attr.value);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(html: &str) -> Vec<Token> {
        Tokenizer::new(html).collect()
    }

    fn start(name: &str, attrs: &[(&str, &str)]) -> Token {
        Token::StartTag {
            name: name.to_string(),
            attributes: attrs
                .iter()
                .map(|(n, v)| Attribute {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            self_closing: false,
        }
    }

    #[test]
    fn attribute_forms() {
        let t = tokens(r#"<img src=x onerror="alert(1)" alt='a b' hidden>"#);
        assert_eq!(
            t,
            vec![start("img", &[("src", "x"), ("onerror", "alert(1)"), ("alt", "a b"), ("hidden", "")])]
        );
    }

    #[test]
    fn tag_and_attribute_names_are_lowercased() {
        let t = tokens(r#"<DIV ID="x" OnClick="y"></DIV>"#);
        assert_eq!(
            t,
            vec![
                start("div", &[("id", "x"), ("onclick", "y")]),
                Token::EndTag { name: "div".into() }
            ]
        );
    }

    #[test]
    fn script_content_is_raw_text() {
        let t = tokens("<script>if (a < b) { x = '</div>'; }</script><p>");
        assert_eq!(t[1], Token::Text("if (a < b) { x = '</div>'; }".into()));
        assert_eq!(t[2], Token::EndTag { name: "script".into() });
        assert_eq!(t[3], start("p", &[]));
    }

    #[test]
    fn lone_angle_bracket_is_text() {
        let t = tokens("a < b");
        assert_eq!(t, vec![Token::Text("a < b".into())]);
    }

    #[test]
    fn comments_and_doctype() {
        let t = tokens("<!DOCTYPE html><!-- hi --><p>");
        assert_eq!(t, vec![Token::Comment(" hi ".into()), start("p", &[])]);
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#39;&#x41;&quot;"), "a & b <c> 'A\"");
        assert_eq!(decode_entities("AT&T &unknown; &"), "AT&T &unknown; &");
    }

    #[test]
    fn builds_nested_tree() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment(r#"<div id="consent-banner"><p>Hi <span>there</span></p><input type="checkbox" name="ads"><button>Ok</button></div>"#);

        let banner = doc.first_element_child(frag).unwrap();
        assert_eq!(doc.attr(banner, "id"), Some("consent-banner"));
        let kids: Vec<_> = doc
            .children(banner)
            .iter()
            .filter_map(|c| doc.tag_name(*c).map(str::to_string))
            .collect();
        assert_eq!(kids, vec!["p", "input", "button"]);
        assert_eq!(doc.text_content(banner), "Hi thereOk");
    }

    #[test]
    fn stray_end_tags_are_ignored_and_open_elements_closed() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment("</span><div><p>text");
        let div = doc.first_element_child(frag).unwrap();
        assert_eq!(doc.tag_name(div), Some("div"));
        let p = doc.first_element_child(div).unwrap();
        assert_eq!(doc.text_content(p), "text");
    }

    #[test]
    fn mismatched_end_tag_closes_up_to_match() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment("<div><span>a</div><p>b</p>");
        let top: Vec<_> = doc
            .children(frag)
            .iter()
            .filter_map(|c| doc.tag_name(*c).map(str::to_string))
            .collect();
        assert_eq!(top, vec!["div", "p"]);
    }

    #[test]
    fn document_parse_fills_body() {
        let doc = Document::parse(r#"<meta name="csrf-token" content="tok">"#);
        let meta = doc.first_element_child(doc.body()).unwrap();
        assert_eq!(doc.attr(meta, "content"), Some("tok"));
    }

    #[test]
    fn nesting_is_capped() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment(&format!("{}<b>deep</b>", "<span>".repeat(5_000)));

        let deepest = doc.descendants(frag).into_iter().last().unwrap();
        let mut depth = 0;
        let mut cur = doc.parent(deepest);
        while let Some(n) = cur {
            depth += 1;
            cur = doc.parent(n);
        }
        // Past the cap <b> is not opened, so the text joins the deepest span
        assert_eq!(doc.text_content(deepest), "deep");
        assert_eq!(depth, MAX_DEPTH + 1);
        assert_eq!(doc.descendants(frag).len(), 5_000 + 2);
    }
}
