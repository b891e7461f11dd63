use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::iso7816::{Protocol, Result};

/// An addressing step taken to reach a DF or an EF.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectorElement {
    ByName(Vec<u8>),
    ById(u16),
}

impl SelectorElement {
    /// Selects the element on the card, returning the FCI.
    pub fn select(&self, protocol: &Protocol) -> Result<Vec<u8>> {
        match self {
            Self::ByName(name) => protocol.select_by_name(name, false),
            Self::ById(id) => protocol.select_by_id(*id),
        }
    }
}

impl Display for SelectorElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByName(name) => write!(f, "#{}", hex::encode(name)),
            Self::ById(id) => write!(f, ":{:04x}", id),
        }
    }
}

/// A path from the master file to a DF or an EF.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selector(Vec<SelectorElement>);

impl Selector {
    pub fn new(path: Vec<SelectorElement>) -> Self {
        Self(path)
    }

    pub fn by_ids(ids: &[u16]) -> Self {
        Self(ids.iter().copied().map(SelectorElement::ById).collect())
    }

    pub fn by_name(name: &[u8]) -> Self {
        Self(vec![SelectorElement::ByName(name.to_vec())])
    }

    pub fn by_name_and_id(name: &[u8], id: u16) -> Self {
        Self::by_name(name).append_path(&[id])
    }

    pub fn path(&self) -> &[SelectorElement] {
        &self.0
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Whether `other` is a prefix of the path.
    pub fn starts_with(&self, other: &Selector) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Returns a new selector with the IDs appended.
    pub fn append_path(&self, ids: &[u16]) -> Self {
        let mut path = self.0.clone();
        path.extend(ids.iter().copied().map(SelectorElement::ById));

        Self(path)
    }

    /// Returns the selector without the last element, or `None` for a single-element path.
    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec())),
        }
    }

    /// Selects every element in turn. Returns the FCI of the last one.
    pub fn select(&self, protocol: &Protocol) -> Result<Vec<u8>> {
        let mut fci = Vec::new();
        for element in &self.0 {
            fci = element.select(protocol)?;
        }

        Ok(fci)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for element in &self.0 {
            element.fmt(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Selector element must start with ':' or '#', found {0:?}")]
    UnexpectedCharacter(char),

    #[error("Invalid hex in selector: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("File ID must be 2 octets, found {0}")]
    InvalidIdLength(usize),
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut path = Vec::new();
        let mut rest = s;

        while let Some(marker) = rest.chars().next() {
            let body = &rest[marker.len_utf8()..];
            let end = body.find([':', '#']).unwrap_or(body.len());
            let bytes = hex::decode(&body[..end])?;

            path.push(match marker {
                '#' => SelectorElement::ByName(bytes),
                ':' => match <[u8; 2]>::try_from(bytes.as_slice()) {
                    Ok(id) => SelectorElement::ById(u16::from_be_bytes(id)),
                    Err(_) => return Err(ParseError::InvalidIdLength(bytes.len())),
                },
                c => return Err(ParseError::UnexpectedCharacter(c)),
            });

            rest = &body[end..];
        }

        Ok(Self(path))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Selector {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;

        text.parse().map_err(serde::de::Error::custom)
    }
}
