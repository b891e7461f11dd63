//! Display trees of what was read from the card

use std::fmt::{Display, Formatter};

/// A node of a display tree: a title with an optional value, and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ListItem {
    pub title: String,
    pub value: Option<String>,
    pub children: Vec<ListItem>,
}

impl ListItem {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn tree(title: impl Into<String>, children: Vec<ListItem>) -> Self {
        Self {
            title: title.into(),
            value: None,
            children,
        }
    }

    fn write_indented(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        write!(f, "{:width$}{}", "", self.title, width = depth * 2)?;
        match &self.value {
            Some(value) => writeln!(f, ": {}", value)?,
            None => writeln!(f)?,
        }

        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }

        Ok(())
    }
}

impl Display for ListItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Renders octets as uppercase hex, separated by spaces.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
