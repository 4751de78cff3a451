use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// An OCFL version number: a non-zero positive integer rendered as `v{N}`.
///
/// Version numbers may be zero-padded (`v0003`); when they are, the padding
/// width is fixed for the lifetime of the object at the width of `v1`, and
/// [`VersionNum::next`] fails once the padded range is exhausted. Equality
/// and ordering consider only the numeric value, never the width.
#[derive(Clone, Copy, Debug)]
pub struct VersionNum {
    num: u64,
    /// Total digit count when zero-padded; 0 means unpadded.
    width: usize,
}

impl VersionNum {
    /// The first version of an object, unpadded.
    pub const V1: Self = Self { num: 1, width: 0 };

    /// Create an unpadded version number. Fails on zero.
    pub fn new(num: u64) -> Result<Self, TypeError> {
        Self::with_width(num, 0)
    }

    /// Create a version number with an explicit padding width.
    pub fn with_width(num: u64, width: usize) -> Result<Self, TypeError> {
        if num == 0 {
            return Err(TypeError::InvalidVersionNum("v0".into()));
        }
        if width > 0 && digits(num) > width {
            return Err(TypeError::InvalidVersionNum(format!(
                "v{num} does not fit in padding width {width}"
            )));
        }
        Ok(Self { num, width })
    }

    /// The numeric value.
    pub fn num(&self) -> u64 {
        self.num
    }

    /// The padding width; 0 when unpadded.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The following version number, preserving the padding width.
    ///
    /// Fails when a padded version number would overflow its width, e.g.
    /// `v99` with width 2.
    pub fn next(&self) -> Result<Self, TypeError> {
        Self::with_width(self.num + 1, self.width)
    }

    /// The preceding version number, or `None` at `v1`.
    pub fn previous(&self) -> Option<Self> {
        if self.num == 1 {
            None
        } else {
            Some(Self {
                num: self.num - 1,
                width: self.width,
            })
        }
    }
}

fn digits(mut num: u64) -> usize {
    let mut count = 1;
    while num >= 10 {
        num /= 10;
        count += 1;
    }
    count
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num
    }
}

impl Eq for VersionNum {}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.num.cmp(&other.num)
    }
}

impl std::hash::Hash for VersionNum {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.num.hash(state);
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width > 0 {
            write!(f, "v{:0width$}", self.num, width = self.width)
        } else {
            write!(f, "v{}", self.num)
        }
    }
}

impl FromStr for VersionNum {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits_part = s
            .strip_prefix('v')
            .ok_or_else(|| TypeError::InvalidVersionNum(s.into()))?;
        if digits_part.is_empty() || !digits_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidVersionNum(s.into()));
        }
        let num: u64 = digits_part
            .parse()
            .map_err(|_| TypeError::InvalidVersionNum(s.into()))?;
        let width = if digits_part.starts_with('0') {
            digits_part.len()
        } else {
            0
        };
        Self::with_width(num, width)
    }
}

impl Serialize for VersionNum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionNum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionNumVisitor;

        impl Visitor<'_> for VersionNumVisitor {
            type Value = VersionNum;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an OCFL version number such as \"v3\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<VersionNum, E> {
                value.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(VersionNumVisitor)
    }
}

/// A mutable-HEAD revision number: `r1`, `r2`, … Never zero-padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionNum(u64);

impl RevisionNum {
    /// The first revision of a mutable HEAD.
    pub const R1: Self = Self(1);

    /// Create a revision number. Fails on zero.
    pub fn new(num: u64) -> Result<Self, TypeError> {
        if num == 0 {
            return Err(TypeError::InvalidRevisionNum("r0".into()));
        }
        Ok(Self(num))
    }

    /// The numeric value.
    pub fn num(&self) -> u64 {
        self.0
    }

    /// The following revision number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RevisionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl FromStr for RevisionNum {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits_part = s
            .strip_prefix('r')
            .ok_or_else(|| TypeError::InvalidRevisionNum(s.into()))?;
        if digits_part.is_empty()
            || digits_part.starts_with('0')
            || !digits_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(TypeError::InvalidRevisionNum(s.into()));
        }
        let num: u64 = digits_part
            .parse()
            .map_err(|_| TypeError::InvalidRevisionNum(s.into()))?;
        Self::new(num)
    }
}
