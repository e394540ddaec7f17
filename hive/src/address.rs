//! Hierarchical actor addresses.
//!
//! An [`Address`] is an immutable sequence of non-empty segments, written as
//! `runner:echo:level1`. The empty address has no segments and is legal.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::errors::AddressError;

pub const SEPARATOR: char = ':';
pub const ESCAPE: char = '\\';

#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Address(Arc<[String]>);

// Implementations

impl Address {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an address from its segments, rejecting empty ones.
    pub fn of<I, S>(segments: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();

        if segments.iter().any(String::is_empty) {
            return Err(AddressError::EmptySegment);
        }

        Ok(Self(segments.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn element(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when every segment of `self` leads `other`. An address is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        self.len() <= other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    pub fn remove_prefix(&self, prefix: &Address) -> Result<Address, AddressError> {
        if !prefix.is_prefix_of(self) {
            return Err(AddressError::NotPrefix {
                prefix: prefix.clone(),
                address: self.clone(),
            });
        }

        Ok(Self(self.0[prefix.len()..].into()))
    }

    pub fn append_suffix(&self, segment: impl Into<String>) -> Result<Address, AddressError> {
        let segment = segment.into();
        if segment.is_empty() {
            return Err(AddressError::EmptySegment);
        }

        let mut segments = self.0.to_vec();
        segments.push(segment);

        Ok(Self(segments.into()))
    }

    pub fn append_address(&self, suffix: &Address) -> Address {
        Self(self.0.iter().chain(suffix.0.iter()).cloned().collect())
    }

    /// The leading `n` segments, or the whole address when it is shorter.
    pub fn head(&self, n: usize) -> Address {
        Self(self.0[..n.min(self.len())].into())
    }

    pub fn parent(&self) -> Option<Address> {
        match self.len() {
            0 => None,
            n => Some(self.head(n - 1)),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::empty());
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(AddressError::DanglingEscape(s.to_string())),
                },
                SEPARATOR => segments.push(std::mem::take(&mut current)),
                c => current.push(c),
            }
        }
        segments.push(current);

        Self::of(segments)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            for c in segment.chars() {
                if c == SEPARATOR || c == ESCAPE {
                    write!(f, "{ESCAPE}")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl TryFrom<Vec<String>> for Address {
    type Error = AddressError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        Self::of(segments)
    }
}

impl From<Address> for Vec<String> {
    fn from(address: Address) -> Self {
        address.0.to_vec()
    }
}
