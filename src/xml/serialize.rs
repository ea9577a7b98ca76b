use super::dom::{Document, Element};
use std::io::Write;
use thiserror::Error;
use xml::writer::events::XmlEvent;
use xml::writer::EventWriter as XmlWriter;

#[derive(Debug, Error)]
/// Failures to write export XML
pub enum Error {
    /// Underlying XML writer had an error
    #[error("Could not write XML: {0}")]
    Xml(#[from] xml::writer::Error),
}

type Result<T> = std::result::Result<T, Error>;

fn write_element<W: Write>(writer: &mut XmlWriter<W>, element: &Element) -> Result<()> {
    let mut start = XmlEvent::start_element(element.name());
    for (name, value) in &element.attributes {
        start = start.attr(name.as_str(), value);
    }
    writer.write(start)?;
    if !element.text().is_empty() {
        writer.write(XmlEvent::characters(element.text()))?;
    }
    for child in element.children() {
        write_element(writer, child)?;
    }
    writer.write(XmlEvent::end_element())?;
    Ok(())
}

/// Write a whole document, including the XML declaration
pub fn write_document<W: Write>(output: W, document: &Document) -> Result<()> {
    let config = xml::EmitterConfig::default()
        .perform_indent(true)
        .indent_string("  ");
    let mut writer = xml::EventWriter::new_with_config(output, config);
    write_element(&mut writer, document.root())
}

/// Serialize a single element subtree without an XML declaration
///
/// Used to produce the plaintext of one section before encryption.
pub fn fragment_to_string(element: &Element) -> Result<String> {
    let mut buffer = Vec::new();
    let config = xml::EmitterConfig::default()
        .perform_indent(false)
        .write_document_declaration(false);
    let mut writer = xml::EventWriter::new_with_config(&mut buffer, config);
    write_element(&mut writer, element)?;
    Ok(String::from_utf8(buffer).expect("writer emits UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_fragment;

    #[test]
    fn fragment_round_trip() {
        let mut tags = Element::new("Tags");
        let mut tag = Element::new("Tag");
        tag.set_attribute("id", "3");
        tag.append_child(Element::with_text("name", "linux"));
        tags.append_child(tag);

        let serialized = fragment_to_string(&tags).unwrap();
        assert!(!serialized.contains("<?xml"));
        let parsed = parse_fragment(serialized.as_bytes()).unwrap();
        assert_eq!(parsed, tags);
    }

    #[test]
    fn escapes_special_characters() {
        let element = Element::with_text("notes", "a < b & c");
        let serialized = fragment_to_string(&element).unwrap();
        let parsed = parse_fragment(serialized.as_bytes()).unwrap();
        assert_eq!(parsed.text(), "a < b & c");
    }
}
