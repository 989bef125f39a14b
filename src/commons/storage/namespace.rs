use std::fmt::{Display, Formatter};
use std::str::FromStr;

//------------ Namespace -----------------------------------------------------

/// The identifier of one store within a storage system.
///
/// Namespaces end up as directory names on disk, so they are restricted
/// to ASCII alphanumeric characters, dashes and underscores.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Parse a `Namespace` from a string.
    pub fn parse(value: &str) -> Result<Self, ParseNamespaceError> {
        if value.is_empty() {
            Err(ParseNamespaceError::Empty)
        } else if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            Err(ParseNamespaceError::IllegalCharacter(c))
        } else {
            Ok(Namespace(value.to_string()))
        }
    }

    /// Create a `Namespace` from a string known to be valid.
    ///
    /// # Panics
    /// Panics if the string is not a valid namespace.
    pub fn make(value: &str) -> Self {
        match Self::parse(value) {
            Ok(namespace) => namespace,
            Err(_) => panic!("invalid namespace: '{value}'"),
        }
    }

    /// Return the encapsulated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Namespace {
    type Err = ParseNamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::parse(s)
    }
}


//------------ ParseNamespaceError -------------------------------------------

/// Represents all ways parsing a string as a [`Namespace`] can fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseNamespaceError {
    Empty,
    IllegalCharacter(char),
}

impl Display for ParseNamespaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseNamespaceError::Empty => {
                write!(f, "namespaces must be nonempty")
            }
            ParseNamespaceError::IllegalCharacter(c) => {
                write!(f, "namespaces must not contain '{c}'")
            }
        }
    }
}

impl std::error::Error for ParseNamespaceError {}


//------------ Tests ---------------------------------------------------------
