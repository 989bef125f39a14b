use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::commons::storage::Scope;

//------------ Segment -------------------------------------------------------

/// A nonempty string that does not start or end with whitespace and does
/// not contain any instances of [`Scope::SEPARATOR`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Segment(String);

impl Segment {
    /// Parse a `Segment` from a string.
    ///
    /// # Errors
    /// If the string is empty, starts or ends with whitespace, or
    /// contains a [`Scope::SEPARATOR`] a [`ParseSegmentError`] variant
    /// will be returned.
    pub fn parse(value: &str) -> Result<Self, ParseSegmentError> {
        if value.is_empty() {
            Err(ParseSegmentError::Empty)
        } else if value.starts_with(char::is_whitespace)
            || value.ends_with(char::is_whitespace)
        {
            Err(ParseSegmentError::TrailingWhitespace)
        } else if value.contains(Scope::SEPARATOR) {
            Err(ParseSegmentError::ContainsSeparator)
        } else {
            Ok(Segment(value.to_string()))
        }
    }

    /// Create a `Segment` from a string known to be valid.
    ///
    /// This should be used for literals and for strings the caller
    /// produced itself, such as formatted numbers.
    ///
    /// # Panics
    /// Panics if the string is not a valid segment.
    pub fn make(value: &str) -> Self {
        match Self::parse(value) {
            Ok(segment) => segment,
            Err(_) => panic!("invalid segment: '{value}'"),
        }
    }

    /// Return the encapsulated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Segment {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Segment::parse(s)
    }
}


//------------ ParseSegmentError ---------------------------------------------

/// Represents all ways parsing a string as a [`Segment`] can fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseSegmentError {
    TrailingWhitespace,
    Empty,
    ContainsSeparator,
}

impl Display for ParseSegmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseSegmentError::TrailingWhitespace => {
                "segments must not start or end with whitespace"
            }
            ParseSegmentError::Empty => "segments must be nonempty",
            ParseSegmentError::ContainsSeparator => {
                "segments must not contain scope separators"
            }
        }
        .fmt(f)
    }
}

impl std::error::Error for ParseSegmentError {}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_fails() {
        assert!(Segment::parse(&format!("te{}st", Scope::SEPARATOR)).is_err());
    }

    #[test]
    fn surrounding_whitespace_fails() {
        assert!(Segment::parse(" test").is_err());
        assert!(Segment::parse("test ").is_err());
        assert!(Segment::parse("test\n").is_err());
    }

    #[test]
    fn empty_fails() {
        assert!(Segment::parse("").is_err());
    }

    #[test]
    fn hostname_like_succeeds() {
        assert!(Segment::parse("vm-042.cloud.example").is_ok());
        assert!(Segment::parse("te st").is_ok());
    }
}
