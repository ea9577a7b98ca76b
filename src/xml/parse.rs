use super::dom::{Document, Element};
use std::io::Read;
use thiserror::Error;
use xml::reader::{EventReader, XmlEvent};

#[derive(Debug, Error)]
/// Error encountered parsing export XML
pub enum Error {
    /// Error from the underlying XML parser, with position information
    #[error("Error parsing export XML: {0}")]
    Xml(String),
    /// The input contained no root element
    #[error("Error parsing export XML: no root element")]
    Empty,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<xml::reader::Error> for Error {
    fn from(e: xml::reader::Error) -> Error {
        Error::Xml(e.to_string())
    }
}

/// Parse a whole document from a reader
///
/// Line endings from arbitrary producers are accepted (the XML parser
/// normalizes them) and no node count or document size cap is applied,
/// as real exports reach tens of megabytes.
pub fn parse_document<R: Read>(input: R) -> Result<Document> {
    Ok(Document::new(parse_root(input)?))
}

/// Parse a decrypted XML fragment into its root element
pub fn parse_fragment(fragment: &[u8]) -> Result<Element> {
    parse_root(fragment)
}

fn parse_root<R: Read>(input: R) -> Result<Element> {
    let config = xml::ParserConfig::new()
        .trim_whitespace(true)
        .cdata_to_characters(true)
        .ignore_comments(true);
    let reader = EventReader::new_with_config(input, config);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    for event in reader {
        match event? {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                let mut element = Element::new(name.local_name);
                for attribute in attributes {
                    element
                        .attributes
                        .push((attribute.name.local_name, attribute.value));
                }
                stack.push(element);
            }
            XmlEvent::Characters(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            XmlEvent::EndElement { .. } => {
                let element = match stack.pop() {
                    Some(element) => element,
                    None => continue,
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            _ => {}
        }
    }

    root.ok_or(Error::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tree_with_attributes() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<Root>
  <Meta><Version>320.0</Version></Meta>
  <Clients>
    <Client id="1"><name>Client A</name></Client>
    <Client id="2"><name>Client B</name></Client>
  </Clients>
</Root>"#;
        let document = parse_document(&xml[..]).unwrap();
        assert_eq!(document.root().name(), "Root");
        let clients = document.root().child("Clients").unwrap();
        assert_eq!(clients.count_children_named("Client"), 2);
        let first = clients.child("Client").unwrap();
        assert_eq!(first.attribute("id"), Some("1"));
        assert_eq!(first.child("name").unwrap().text(), "Client A");
    }

    #[test]
    fn accepts_foreign_line_endings() {
        let xml = b"<Root>\r\n<Meta>\r<Version>320.0</Version>\r\n</Meta>\r\n</Root>";
        let document = parse_document(&xml[..]).unwrap();
        assert_eq!(
            document.select("/Root/Meta/Version").unwrap()[0].text(),
            "320.0"
        );
    }

    #[test]
    fn cdata_folds_into_text() {
        let xml = b"<Root><notes><![CDATA[a < b]]></notes></Root>";
        let document = parse_document(&xml[..]).unwrap();
        assert_eq!(document.root().child("notes").unwrap().text(), "a < b");
    }

    #[test]
    fn malformed_input_reports_position() {
        let err = parse_document(&b"<Root><Meta></Root>"[..]).unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
    }

    #[test]
    fn fragment_parses_to_element() {
        let element = parse_fragment(b"<Tags><Tag id=\"9\"><name>t</name></Tag></Tags>").unwrap();
        assert_eq!(element.name(), "Tags");
        assert_eq!(element.count_children_named("Tag"), 1);
    }
}
