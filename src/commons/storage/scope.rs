use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::commons::storage::{ParseSegmentError, Segment};

//------------ Scope ---------------------------------------------------------

/// Used to scope a [`Key`]. Consists of a vector of zero or more
/// [`Segment`]s.
///
/// [`Key`]: crate::commons::storage::Key
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Scope {
    segments: Vec<Segment>,
}

impl Scope {
    /// Character used to split on when parsing a `Scope` from a string.
    pub const SEPARATOR: char = '/';

    /// Create a `Scope` from a vector of [`Segment`]s.
    pub fn new(segments: Vec<Segment>) -> Self {
        Scope { segments }
    }

    /// Create a `Scope` from a single [`Segment`].
    pub fn from_segment(segment: Segment) -> Self {
        Scope::new(vec![segment])
    }

    /// Create an empty `Scope`.
    pub fn global() -> Self {
        Scope::new(Vec::new())
    }

    /// Returns whether the underlying vector is empty.
    pub fn is_global(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns whether the encapsulated vector starts with a certain
    /// prefix.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        if prefix.segments.len() <= self.segments.len() {
            self.segments[0..prefix.segments.len()] == prefix.segments
        } else {
            false
        }
    }

    /// Returns the underlying vector of [`Segment`]s.
    pub fn as_vec(&self) -> &Vec<Segment> {
        &self.segments
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.segments
                .iter()
                .map(|segment| segment.as_str())
                .collect::<Vec<_>>()
                .join(Self::SEPARATOR.encode_utf8(&mut [0; 4]))
        )
    }
}

impl FromStr for Scope {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix(Self::SEPARATOR).unwrap_or(s);
        let segments = s
            .split(Self::SEPARATOR)
            .map(Segment::parse)
            .collect::<Result<_, _>>()?;
        Ok(Scope { segments })
    }
}


//------------ Tests ---------------------------------------------------------
