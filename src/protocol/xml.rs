//! Loose XML tree for the engine's response documents.
//!
//! The engine serializes the same logical field in three equivalent shapes
//! depending on version and request path: a bare text element, a wrapper
//! element with the value nested one or more levels down, or nothing at
//! all. That quirk is externally imposed and must be absorbed here, in one
//! place; the accessors on [`XmlElement`] normalize all three shapes so the
//! ambiguity never leaks past the protocol client. Missing or unreadable
//! scalars default and log rather than erroring.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::types::ProtocolError;

/// One element of a parsed response document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlElement>,
    /// Concatenated direct text content, trimmed.
    pub text: String,
}

impl XmlElement {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Direct children with the given tag name (case-insensitive; the
    /// engine is not consistent about casing either). The iterator borrows
    /// only from `self`, so a short-lived lookup name never shortens the
    /// result.
    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a XmlElement> + use<'a> {
        let name = name.to_ascii_uppercase();
        self.children
            .iter()
            .filter(move |c| c.name.eq_ignore_ascii_case(&name))
    }

    pub fn first(&self, name: &str) -> Option<&XmlElement> {
        self.children_named(name).next()
    }

    /// All descendants with the given tag name, depth-first.
    pub fn descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name.eq_ignore_ascii_case(name) {
                out.push(child);
            }
            child.descendants(name, out);
        }
    }

    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.descendants(name, &mut out);
        out
    }

    /// Text of a field, accepting the three equivalent shapes.
    ///
    /// Bare: `<PARTY>Acme</PARTY>`. Wrapped: `<PARTY><NAME>Acme</NAME></PARTY>`
    /// (value nested under an arbitrary inner element). Absent: `None`.
    pub fn loose_text(&self, name: &str) -> Option<String> {
        let field = self.first(name)?;
        if !field.text.is_empty() {
            return Some(field.text.clone());
        }
        if !field.children.is_empty() {
            debug!(field = name, "Field arrived in wrapped shape, unwrapping");
            return field.first_nested_text();
        }
        // Present but empty counts as present: `<NARRATION/>`.
        Some(String::new())
    }

    fn first_nested_text(&self) -> Option<String> {
        for child in &self.children {
            if !child.text.is_empty() {
                return Some(child.text.clone());
            }
            if let Some(text) = child.first_nested_text() {
                return Some(text);
            }
        }
        None
    }

    /// Numeric field with shape normalization. Unparseable or absent values
    /// default to zero and are logged, never raised.
    pub fn loose_f64(&self, name: &str) -> f64 {
        match self.loose_text(name) {
            Some(raw) if !raw.is_empty() => match raw.replace(',', "").parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(field = name, value = %raw, "Unparseable numeric field, defaulting to 0");
                    0.0
                }
            },
            _ => 0.0,
        }
    }

    pub fn loose_u64(&self, name: &str) -> u64 {
        match self.loose_text(name) {
            Some(raw) if !raw.is_empty() => match raw.parse::<u64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(field = name, value = %raw, "Unparseable counter field, defaulting to 0");
                    0
                }
            },
            _ => 0,
        }
    }
}

/// Build an element from an opening or self-closing tag, attributes
/// included.
fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, ProtocolError> {
    let mut element =
        XmlElement::named(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ProtocolError::Malformed(format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ProtocolError::Malformed(format!("bad attribute value: {e}")))?
            .into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

/// Parse a whole response document into a tree rooted at its top element.
pub fn parse_document(xml: &str) -> Result<XmlElement, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(open_element(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let element = open_element(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map_err(|e| ProtocolError::Malformed(format!("bad text node: {e}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(content.trim());
                }
            }
            Ok(Event::CData(data)) => {
                let content = String::from_utf8_lossy(&data.into_inner()).into_owned();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(content.trim());
                }
            }
            Ok(Event::End(_)) => {
                let finished = stack
                    .pop()
                    .ok_or_else(|| ProtocolError::Malformed("unbalanced close tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(finished),
                    None => root = Some(finished),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, processing instructions
            Err(e) => return Err(ProtocolError::Malformed(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(ProtocolError::Malformed("truncated document".to_string()));
    }
    root.ok_or_else(|| ProtocolError::Malformed("empty document".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_shape_reads_directly() {
        let root = parse_document("<V><PARTY>Acme &amp; Co</PARTY></V>").unwrap();
        assert_eq!(root.loose_text("PARTY").as_deref(), Some("Acme & Co"));
    }

    #[test]
    fn wrapped_shape_unwraps_to_nested_value() {
        let root =
            parse_document("<V><AMOUNT><VALUE>1234.50</VALUE><CURRENCY>INR</CURRENCY></AMOUNT></V>")
                .unwrap();
        assert_eq!(root.loose_f64("AMOUNT"), 1234.50);
    }

    #[test]
    fn absent_field_is_none_and_numeric_defaults() {
        let root = parse_document("<V><PARTY>Acme</PARTY></V>").unwrap();
        assert_eq!(root.loose_text("AMOUNT"), None);
        assert_eq!(root.loose_f64("AMOUNT"), 0.0);
    }

    #[test]
    fn unparseable_numeric_defaults_to_zero() {
        let root = parse_document("<V><ALTERID>abc</ALTERID></V>").unwrap();
        assert_eq!(root.loose_u64("ALTERID"), 0);
    }

    #[test]
    fn empty_and_self_closed_elements_count_as_present() {
        let root = parse_document("<V><NARRATION/><REMARK></REMARK></V>").unwrap();
        assert_eq!(root.loose_text("NARRATION").as_deref(), Some(""));
        assert_eq!(root.loose_text("REMARK").as_deref(), Some(""));
    }

    #[test]
    fn descendants_collects_across_nesting() {
        let root = parse_document(
            "<ENVELOPE><BODY><DATA><COLLECTION>\
             <VOUCHER><GUID>a</GUID></VOUCHER>\
             <VOUCHER><GUID>b</GUID></VOUCHER>\
             </COLLECTION></DATA></BODY></ENVELOPE>",
        )
        .unwrap();
        assert_eq!(root.find_all("VOUCHER").len(), 2);
    }

    #[test]
    fn attributes_are_captured() {
        let root = parse_document(r#"<VOUCHER REMOTEID="x-17" VCHTYPE="Sales"/>"#).unwrap();
        let voucher = root;
        assert_eq!(voucher.attributes.get("REMOTEID").map(String::as_str), Some("x-17"));
    }

    #[test]
    fn self_closed_children_keep_their_attributes() {
        // Legacy records carry their only identity as an attribute on a
        // self-closing tag.
        let root =
            parse_document(r#"<COLLECTION><VOUCHER REMOTEID="x-17"/></COLLECTION>"#).unwrap();
        let voucher = root.first("VOUCHER").unwrap();
        assert_eq!(voucher.attributes.get("REMOTEID").map(String::as_str), Some("x-17"));
    }

    #[test]
    fn lookup_name_does_not_shorten_the_result() {
        let root = parse_document("<V><PARTY>Acme</PARTY></V>").unwrap();
        let child = {
            let name = String::from("party");
            root.first(&name)
        };
        assert_eq!(child.map(|c| c.text.as_str()), Some("Acme"));
    }

    #[test]
    fn truncated_document_is_malformed() {
        assert!(matches!(
            parse_document("<ENVELOPE><BODY>"),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
