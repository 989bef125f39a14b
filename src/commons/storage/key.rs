use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::commons::storage::{ParseSegmentError, Scope, Segment};

//------------ Key -----------------------------------------------------------

/// The address of a single value in a store. Consists of a `scope` of
/// type [`Scope`] and a `name` of type [`Segment`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Key {
    scope: Scope,
    name: Segment,
}

impl Key {
    /// Create a `Key` from a [`Scope`] and a [`Segment`].
    pub fn new_scoped(scope: Scope, name: Segment) -> Key {
        Key { name, scope }
    }

    /// Create a `Key` in the global scope from a [`Segment`].
    pub fn new_global(name: Segment) -> Key {
        Key::new_scoped(Scope::global(), name)
    }

    /// Returns the name of a `Key` (without its scope).
    pub fn name(&self) -> &Segment {
        &self.name
    }

    /// Returns the scope of a `Key` (without its name).
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.scope.is_global() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{}{}", self.scope, Scope::SEPARATOR, self.name)
        }
    }
}

impl FromStr for Key {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments: Vec<Segment> = s
            .split(Scope::SEPARATOR)
            .map(Segment::parse)
            .collect::<Result<_, _>>()?;
        let name = segments.pop().ok_or(ParseSegmentError::Empty)?;
        let scope = Scope::new(segments);

        Ok(Key { name, scope })
    }
}


//------------ Tests ---------------------------------------------------------
