#![forbid(unsafe_code)]

//! Static template markup parsing.
//!
//! Templates are compiler output, so the parser accepts a small, regular
//! subset of HTML: text, comments, elements with quoted, unquoted or boolean
//! attributes, void elements and self-closing tags. Unclosed elements are
//! closed at end of input; a mismatched closing tag is an error.

use crate::dom::{Document, NodeRef, VOID_ELEMENTS};
use crate::error::{Result, RuntimeError};

/// Parse `markup` into `doc` and return the single root to clone from.
///
/// The root is a fragment when the markup yields several top-level nodes,
/// when its only node is a comment, or when `ensure_fragment` is set. Empty
/// markup yields an empty text node (or an empty fragment when a fragment is
/// required).
///
/// # Errors
///
/// [`RuntimeError::Template`] for unterminated tags or comments and for
/// mismatched closing tags.
pub fn parse_template(doc: &mut Document, markup: &str, ensure_fragment: bool) -> Result<NodeRef> {
    let nodes = Parser::new(doc, markup).parse()?;
    let needs_fragment = ensure_fragment
        || nodes.len() > 1
        || nodes.first().is_some_and(|node| doc.is_comment(*node));
    if needs_fragment {
        let fragment = doc.create_fragment();
        for node in nodes {
            doc.append_child(fragment, node);
        }
        return Ok(fragment);
    }
    Ok(match nodes.first() {
        Some(node) => *node,
        None => doc.create_text(""),
    })
}

struct Parser<'a> {
    doc: &'a mut Document,
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(doc: &'a mut Document, src: &'a str) -> Self {
        Self { doc, src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Template {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        let src = self.src;
        &src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
        let src = self.src;
        &src[start..self.pos]
    }

    /// Top-level nodes in order.
    fn parse(mut self) -> Result<Vec<NodeRef>> {
        let mut roots = Vec::new();
        let mut open: Vec<(NodeRef, String)> = Vec::new();

        while self.pos < self.src.len() {
            let node = if self.rest().starts_with("<!--") {
                self.comment()?
            } else if self.rest().starts_with("</") {
                self.close(&mut open)?;
                continue;
            } else if self.rest().starts_with('<') {
                let (element, tag, self_closing) = self.open_tag()?;
                attach(self.doc, &open, &mut roots, element);
                if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
                    open.push((element, tag));
                }
                continue;
            } else {
                self.text()
            };
            attach(self.doc, &open, &mut roots, node);
        }
        Ok(roots)
    }

    fn comment(&mut self) -> Result<NodeRef> {
        self.pos += "<!--".len();
        let Some(end) = self.rest().find("-->") else {
            return Err(self.error("unterminated comment"));
        };
        let body = &self.rest()[..end];
        self.pos += end + "-->".len();
        Ok(self.doc.create_comment(body))
    }

    fn text(&mut self) -> NodeRef {
        let raw = self.take_while(|ch| ch != '<');
        let decoded = decode_entities(raw);
        self.doc.create_text(&decoded)
    }

    fn close(&mut self, open: &mut Vec<(NodeRef, String)>) -> Result<()> {
        self.pos += "</".len();
        let name = self.take_while(is_name_char).to_ascii_lowercase();
        self.skip_whitespace();
        if self.bump() != Some('>') {
            return Err(self.error(format!("unterminated closing tag `{name}`")));
        }
        match open.pop() {
            Some((_, tag)) if tag == name => Ok(()),
            Some((_, tag)) => Err(self.error(format!("expected `</{tag}>`, found `</{name}>`"))),
            None => Err(self.error(format!("unexpected closing tag `</{name}>`"))),
        }
    }

    fn open_tag(&mut self) -> Result<(NodeRef, String, bool)> {
        self.pos += 1;
        let tag = self.take_while(is_name_char).to_ascii_lowercase();
        if tag.is_empty() {
            return Err(self.error("expected a tag name after `<`"));
        }
        let element = self.doc.create_element(&tag);
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(format!("unterminated tag `<{tag}`"))),
                Some('>') => {
                    self.bump();
                    return Ok((element, tag, false));
                }
                Some('/') => {
                    self.bump();
                    if self.bump() != Some('>') {
                        return Err(self.error("expected `>` after `/`"));
                    }
                    return Ok((element, tag, true));
                }
                Some(_) => {
                    let name = self.take_while(|ch| {
                        !ch.is_whitespace() && !matches!(ch, '=' | '>' | '/')
                    });
                    if name.is_empty() {
                        return Err(self.error("expected an attribute name"));
                    }
                    self.skip_whitespace();
                    let value = if self.peek() == Some('=') {
                        self.bump();
                        self.skip_whitespace();
                        self.attribute_value()?
                    } else {
                        String::new()
                    };
                    self.doc.set_attribute(element, name, &value);
                }
            }
        }
    }

    fn attribute_value(&mut self) -> Result<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let Some(end) = self.rest().find(quote) else {
                    return Err(self.error("unterminated attribute value"));
                };
                let raw = &self.rest()[..end];
                self.pos += end + 1;
                Ok(decode_entities(raw))
            }
            _ => {
                let raw = self.take_while(|ch| !ch.is_whitespace() && ch != '>');
                Ok(decode_entities(raw))
            }
        }
    }
}

fn attach(doc: &mut Document, open: &[(NodeRef, String)], roots: &mut Vec<NodeRef>, node: NodeRef) {
    match open.last() {
        Some((parent, _)) => doc.append_child(*parent, node),
        None => roots.push(node),
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.')
}

/// Decode the character references compiled templates emit.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let ch = match &rest[1..semi] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                numeric => numeric
                    .strip_prefix("#x")
                    .or_else(|| numeric.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| numeric.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeData;

    fn parsed(markup: &str, ensure_fragment: bool) -> (Document, NodeRef) {
        let mut doc = Document::new();
        let root = parse_template(&mut doc, markup, ensure_fragment).expect("parses");
        (doc, root)
    }

    #[test]
    fn single_element_is_its_own_root() {
        let (doc, root) = parsed("<button> </button>", false);
        assert!(matches!(doc.data(root), NodeData::Element { tag, .. } if tag == "button"));
        let text = doc.first_child(root).expect("text child");
        assert_eq!(doc.text(text), Some(" "));
    }

    #[test]
    fn several_roots_become_a_fragment() {
        let (doc, root) = parsed("<b>x</b>tail", false);
        assert!(doc.is_fragment(root));
        assert_eq!(doc.children(root).count(), 2);
        assert_eq!(doc.to_markup(root), "<b>x</b>tail");
    }

    #[test]
    fn lone_comment_and_forced_fragments() {
        let (doc, root) = parsed("<!--marker-->", false);
        assert!(doc.is_fragment(root));

        let (doc, root) = parsed("<p></p>", true);
        assert!(doc.is_fragment(root));
        assert_eq!(doc.children(root).count(), 1);
    }

    #[test]
    fn empty_template_is_an_empty_text_node() {
        let (doc, root) = parsed("", false);
        assert_eq!(doc.text(root), Some(""));
        let (doc, root) = parsed("", true);
        assert!(doc.is_fragment(root));
        assert_eq!(doc.first_child(root), None);
    }

    #[test]
    fn attributes_void_and_self_closing() {
        let (doc, root) = parsed(
            "<div id=main class='a b' hidden data-x=\"1 &amp; 2\"><input value=x><br/>ok</div>",
            false,
        );
        assert_eq!(doc.attribute(root, "id"), Some("main"));
        assert_eq!(doc.attribute(root, "class"), Some("a b"));
        assert_eq!(doc.attribute(root, "hidden"), Some(""));
        assert_eq!(doc.attribute(root, "data-x"), Some("1 & 2"));
        assert_eq!(doc.children(root).count(), 3);
        assert_eq!(doc.text_content(root), "ok");
    }

    #[test]
    fn entities_in_text() {
        let (doc, root) = parsed("a &lt;b&gt; &#65;&#x42; &bogus; &", false);
        assert_eq!(doc.text(root), Some("a <b> AB &bogus; &"));
    }

    #[test]
    fn unclosed_elements_close_at_end() {
        let (doc, root) = parsed("<ul><li>one", false);
        assert_eq!(doc.to_markup(root), "<ul><li>one</li></ul>");
    }

    #[test]
    fn malformed_markup_is_reported() {
        let mut doc = Document::new();
        for bad in ["<div></span>", "</p>", "<!-- open", "<a href=\"x>", "<div"] {
            let err = parse_template(&mut doc, bad, false).expect_err(bad);
            assert!(matches!(err, RuntimeError::Template { .. }), "{bad}: {err}");
        }
    }
}
