use thiserror::Error;

#[derive(Debug, Error)]
/// Error evaluating a node selection path
pub enum SelectError {
    /// The path was empty, relative, or contained an empty step
    #[error("Invalid selection expression: {0:?}")]
    InvalidExpression(String),
}

/// A single XML element with attributes, text content and child elements
///
/// Mixed content is not modelled; the export format never interleaves
/// text and elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    pub(crate) text: String,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    /// Create an element holding only text content
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            text: text.into(),
            ..Element::default()
        }
    }

    /// Tag name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text content, empty string when none
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text content
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set or replace an attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(attr, _)| *attr == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All child elements, in document order
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter()
    }

    /// Child elements with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Number of child elements with the given name
    pub fn count_children_named(&self, name: &str) -> usize {
        self.children_named(name).count()
    }

    /// Append a child element
    pub fn append_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Remove every child element with the given name, returning how many
    /// were removed
    pub fn remove_children_named(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|child| child.name != name);
        before - self.children.len()
    }
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub(crate) root: Element,
}

impl Document {
    /// Build a document around a root element
    pub fn new(root: Element) -> Document {
        Document { root }
    }

    /// The document root element
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Select elements by an absolute slash separated path, e.g.
    /// `/Root/Meta/Version`
    ///
    /// Returns matches in document order. The path must be absolute and
    /// every step non-empty, otherwise the expression is rejected.
    pub fn select(&self, path: &str) -> Result<Vec<&Element>, SelectError> {
        let invalid = || SelectError::InvalidExpression(path.to_string());
        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }
        let mut steps = rest.split('/');
        let root_step = steps.next().ok_or_else(invalid)?;
        if root_step.is_empty() {
            return Err(invalid());
        }

        let mut matches: Vec<&Element> = if self.root.name == root_step {
            vec![&self.root]
        } else {
            Vec::new()
        };
        for step in steps {
            if step.is_empty() {
                return Err(invalid());
            }
            let mut next = Vec::new();
            for element in &matches {
                for child in &element.children {
                    if child.name == step {
                        next.push(child);
                    }
                }
            }
            matches = next;
        }
        Ok(matches)
    }
}
