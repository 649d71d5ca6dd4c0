//! Experiment data model
//!
//! Validated names for cache groups and segment keys, the [`Segment`]
//! position within an experiment, and the [`SegmentPair`] holding both keys.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the request parameter that forces a segment
pub const OVERRIDE_PARAM_PREFIX: &str = "group-";

/// Prefix of the persisted option that forces a segment site-wide
pub const OVERRIDE_OPTION_PREFIX: &str = "ab-select-group-";

/// Name of an experiment as known to the cache segmentation service
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheGroup(String);

impl CacheGroup {
    /// Create a cache group, rejecting empty names
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigurationError::MissingCacheGroup);
        }
        Ok(Self(name))
    }

    /// Group name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Request parameter that overrides this group (`group-<name>`)
    #[must_use]
    pub fn override_param(&self) -> String {
        format!("{OVERRIDE_PARAM_PREFIX}{}", self.0)
    }

    /// Persisted option that overrides this group (`ab-select-group-<name>`)
    #[must_use]
    pub fn override_option(&self) -> String {
        format!("{OVERRIDE_OPTION_PREFIX}{}", self.0)
    }
}

impl TryFrom<String> for CacheGroup {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheGroup> for String {
    fn from(group: CacheGroup) -> Self {
        group.0
    }
}

impl AsRef<str> for CacheGroup {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two bucket names of an experiment
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentKey(String);

impl SegmentKey {
    /// Wrap a key read back from storage; `None` if empty
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Segment key text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SegmentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SegmentKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SegmentKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a segment within its experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// First segment (conventionally the control)
    A,
    /// Second segment
    B,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// The two distinct, non-empty segment keys of an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPair {
    a: SegmentKey,
    b: SegmentKey,
}

impl SegmentPair {
    /// Validate a pair of keys for the experiment named `experiment`
    ///
    /// # Errors
    /// - [`ConfigurationError::MissingSegmentKey`] if either key is empty
    /// - [`ConfigurationError::DuplicateSegmentKeys`] if both keys are equal
    pub fn new(
        experiment: &str,
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let a = a.into();
        let b = b.into();

        for (position, key) in [(Segment::A, &a), (Segment::B, &b)] {
            if key.is_empty() {
                return Err(ConfigurationError::MissingSegmentKey {
                    experiment: experiment.to_string(),
                    position,
                });
            }
        }

        if a == b {
            return Err(ConfigurationError::DuplicateSegmentKeys {
                experiment: experiment.to_string(),
                key: a,
            });
        }

        Ok(Self {
            a: SegmentKey(a),
            b: SegmentKey(b),
        })
    }

    /// Key at `segment`
    #[inline]
    #[must_use]
    pub fn key(&self, segment: Segment) -> &SegmentKey {
        match segment {
            Segment::A => &self.a,
            Segment::B => &self.b,
        }
    }

    /// Position of `value`, if it exactly matches one of the keys
    #[must_use]
    pub fn position(&self, value: &str) -> Option<Segment> {
        if self.a == value {
            Some(Segment::A)
        } else if self.b == value {
            Some(Segment::B)
        } else {
            None
        }
    }

    /// Whether `value` exactly matches one of the keys
    #[inline]
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.position(value).is_some()
    }

    /// Both keys in A, B order
    pub fn iter(&self) -> impl Iterator<Item = (Segment, &SegmentKey)> {
        [(Segment::A, &self.a), (Segment::B, &self.b)].into_iter()
    }
}

/// Identity of a visitor, as seen by the cache segmentation service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    /// Wrap a visitor identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VisitorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
