//! Decode raw XML bytes into an untyped [`RawNode`] tree using quick-xml.
//!
//! The tree mirrors what a permissive XML-to-object converter produces when
//! automatic array wrapping is turned off:
//!
//! - the document becomes a one-entry map `{ root_name: root_node }`;
//! - an element without attributes or child elements becomes `Text`;
//! - attributes are grouped under `"$"`, mixed character data under `"_"`;
//! - a child name seen once maps to the node itself, seen several times to a
//!   `List` in document order.
//!
//! Callers reading a potentially repeated element must therefore cope with
//! both a single node and a list (see [`crate::locator::Repeated`]).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key under which element attributes are grouped.
pub const ATTRIBUTES_KEY: &str = "$";
/// Key under which character data of a non-leaf element is stored.
pub const TEXT_KEY: &str = "_";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Deepest element nesting accepted by [`decode`]. Dropping, comparing and
/// serializing a [`RawNode`] recurse once per level.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid encoding: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: usize, message: String },
    #[error("document has no root element")]
    NoRoot,
}

/// An untyped node of the decoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawNode {
    Text(String),
    Map(BTreeMap<String, RawNode>),
    List(Vec<RawNode>),
}

impl RawNode {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawNode::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RawNode>> {
        match self {
            RawNode::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Child lookup; `None` unless this node is a map holding `key`.
    pub fn get(&self, key: &str) -> Option<&RawNode> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// True for text consisting only of whitespace (an empty element).
    pub fn is_blank(&self) -> bool {
        matches!(self, RawNode::Text(text) if text.trim().is_empty())
    }
}

/// Element under construction while its end tag has not been seen yet.
struct OpenElement {
    name: String,
    attributes: BTreeMap<String, RawNode>,
    children: Vec<(String, RawNode)>,
    text: String,
}

impl OpenElement {
    fn new(start: &BytesStart<'_>, position: usize) -> Result<Self, DecodeError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| malformed(position, err))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| malformed(position, err))?
                .into_owned();
            attributes.insert(key, RawNode::Text(value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn finish(self) -> (String, RawNode) {
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, RawNode::Text(self.text));
        }

        let mut map = BTreeMap::new();
        if !self.attributes.is_empty() {
            map.insert(ATTRIBUTES_KEY.to_string(), RawNode::Map(self.attributes));
        }
        let text = self.text.trim();
        if !text.is_empty() {
            map.insert(TEXT_KEY.to_string(), RawNode::Text(text.to_string()));
        }
        for (key, child) in self.children {
            insert_child(&mut map, key, child);
        }
        (self.name, RawNode::Map(map))
    }
}

/// Repeated names collapse into a list; a single occurrence stays as is.
fn insert_child(map: &mut BTreeMap<String, RawNode>, key: String, child: RawNode) {
    match map.remove(&key) {
        None => {
            map.insert(key, child);
        }
        Some(RawNode::List(mut items)) => {
            items.push(child);
            map.insert(key, RawNode::List(items));
        }
        Some(existing) => {
            map.insert(key, RawNode::List(vec![existing, child]));
        }
    }
}

fn malformed(position: usize, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Malformed {
        position,
        message: err.to_string(),
    }
}

/// Decode a complete XML document held in memory.
///
/// Fails on invalid UTF-8, mismatched or unterminated tags, unknown
/// entities, a missing root element, content after the root element, or
/// nesting deeper than [`MAX_DEPTH`].
pub fn decode(bytes: &[u8]) -> Result<RawNode, DecodeError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let xml = std::str::from_utf8(bytes)?;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    reader.check_end_names(true);
    reader.expand_empty_elements(false);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, RawNode)> = None;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if root.is_some() {
                    return Err(malformed(position, "more than one root element"));
                }
                check_depth(&stack, position)?;
                stack.push(OpenElement::new(&start, position)?);
            }
            Ok(Event::Empty(start)) => {
                if root.is_some() {
                    return Err(malformed(position, "more than one root element"));
                }
                check_depth(&stack, position)?;
                let element = OpenElement::new(&start, position)?;
                close_element(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(position, "unexpected closing tag"))?;
                close_element(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|err| malformed(position, err))?;
                append_text(&mut stack, &text, position)?;
            }
            Ok(Event::CData(cdata)) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                append_text(&mut stack, &text, position)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(malformed(reader.buffer_position(), err)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            reader.buffer_position(),
            format!("unterminated element <{}>", open.name),
        ));
    }

    let (name, node) = root.ok_or(DecodeError::NoRoot)?;
    let mut document = BTreeMap::new();
    document.insert(name, node);
    Ok(RawNode::Map(document))
}

fn check_depth(stack: &[OpenElement], position: usize) -> Result<(), DecodeError> {
    if stack.len() >= MAX_DEPTH {
        return Err(malformed(
            position,
            format!("elements nested deeper than {} levels", MAX_DEPTH),
        ));
    }
    Ok(())
}

fn close_element(
    stack: &mut [OpenElement],
    root: &mut Option<(String, RawNode)>,
    element: OpenElement,
) {
    let (name, node) = element.finish();
    match stack.last_mut() {
        Some(parent) => parent.children.push((name, node)),
        None => *root = Some((name, node)),
    }
}

fn append_text(stack: &mut [OpenElement], text: &str, position: usize) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed(position, "text outside the root element")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> RawNode {
        RawNode::Text(value.to_string())
    }

    #[test]
    fn leaf_elements_decode_to_text() {
        let tree = decode(b"<Root><Name>Asha</Name><Empty/></Root>").unwrap();
        let root = tree.get("Root").unwrap();
        assert_eq!(root.get("Name"), Some(&text("Asha")));
        assert_eq!(root.get("Empty"), Some(&text("")));
    }

    #[test]
    fn single_child_is_not_wrapped_in_a_list() {
        let tree = decode(b"<R><Item><A>1</A></Item></R>").unwrap();
        let item = tree.get("R").and_then(|r| r.get("Item")).unwrap();
        assert!(matches!(item, RawNode::Map(_)));
    }

    #[test]
    fn repeated_children_become_a_list_in_document_order() {
        let tree = decode(b"<R><Item>a</Item><Other>x</Other><Item>b</Item><Item>c</Item></R>")
            .unwrap();
        let items = tree.get("R").and_then(|r| r.get("Item")).unwrap();
        assert_eq!(items, &RawNode::List(vec![text("a"), text("b"), text("c")]));
    }

    #[test]
    fn attributes_and_mixed_text_use_reserved_keys() {
        let tree = decode(br#"<R><Score type="bureau">780</Score></R>"#).unwrap();
        let score = tree.get("R").and_then(|r| r.get("Score")).unwrap();
        assert_eq!(score.get(TEXT_KEY), Some(&text("780")));
        assert_eq!(
            score.get(ATTRIBUTES_KEY).and_then(|a| a.get("type")),
            Some(&text("bureau"))
        );
    }

    #[test]
    fn entities_and_cdata_are_unescaped() {
        let tree = decode(b"<R><Bank>A &amp; B</Bank><Note><![CDATA[<raw>]]></Note></R>").unwrap();
        let root = tree.get("R").unwrap();
        assert_eq!(root.get("Bank"), Some(&text("A & B")));
        assert_eq!(root.get("Note"), Some(&text("<raw>")));
    }

    #[test]
    fn whitespace_between_children_is_dropped() {
        let tree = decode(b"<?xml version=\"1.0\"?>\n<R>\n  <A>1</A>\n</R>\n").unwrap();
        let root = tree.get("R").unwrap().as_map().unwrap();
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn decoding_is_deterministic() {
        let doc = br#"<R a="1"><B>x</B><B>y</B><C><D/></C></R>"#;
        assert_eq!(decode(doc).unwrap(), decode(doc).unwrap());
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let tree = decode(b"\xEF\xBB\xBF<R>ok</R>").unwrap();
        assert_eq!(tree.get("R"), Some(&text("ok")));
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let err = decode(b"<R><A>1</B></R>").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn unterminated_elements_are_rejected() {
        let err = decode(b"<R><A>1</A>").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = decode(b"<R>\xff\xfe</R>").unwrap_err();
        assert!(matches!(err, DecodeError::Encoding(_)));
    }

    #[test]
    fn empty_input_has_no_root() {
        assert!(matches!(decode(b"").unwrap_err(), DecodeError::NoRoot));
        assert!(matches!(decode(b"  \n").unwrap_err(), DecodeError::NoRoot));
    }

    #[test]
    fn nesting_limit_is_inclusive() {
        let at_limit = format!("{}{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(decode(at_limit.as_bytes()).is_ok());

        let past_limit = format!("{}<b/>{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(matches!(
            decode(past_limit.as_bytes()).unwrap_err(),
            DecodeError::Malformed { .. }
        ));
    }

    #[test]
    fn deeply_nested_documents_are_rejected() {
        let depth = 100_000;
        let doc = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let err = decode(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("nested deeper than 256 levels"));
    }

    #[test]
    fn second_root_element_is_rejected() {
        assert!(decode(b"<A/><B/>").is_err());
        assert!(decode(b"<A></A>trailing").is_err());
    }
}
