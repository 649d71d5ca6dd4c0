//! Per-request inputs and state
//!
//! - [`RequestKind`]: which request contexts run segment assignment
//! - [`QueryParams`]: request parameters, read as sanitized plain text
//! - [`RequestScope`]: the segments resolved during one request

use crate::segment::{CacheGroup, SegmentKey, VisitorId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Request context, as detected by the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Cacheable front-end page view
    #[default]
    FrontEnd,
    /// Administrative screen
    Admin,
    /// Scheduled task
    Cron,
    /// Background/async job
    Ajax,
    /// API request
    Rest,
}

impl RequestKind {
    /// Whether assignment runs for this kind of request
    #[inline]
    #[must_use]
    pub fn is_front_end(self) -> bool {
        matches!(self, Self::FrontEnd)
    }

    /// Kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FrontEnd => "front-end",
            Self::Admin => "admin",
            Self::Cron => "cron",
            Self::Ajax => "ajax",
            Self::Rest => "rest",
        }
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front-end" | "frontend" => Ok(Self::FrontEnd),
            "admin" => Ok(Self::Admin),
            "cron" => Ok(Self::Cron),
            "ajax" => Ok(Self::Ajax),
            "rest" => Ok(Self::Rest),
            other => Err(format!(
                "unknown request kind '{other}' (expected front-end, admin, cron, ajax or rest)"
            )),
        }
    }
}

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*?>.*?</(script|style)>").expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\p{Cc}]+").expect("static regex"));
static OCTET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%[a-f0-9]{2}").expect("static regex"));

/// Reduce untrusted input to a single line of plain text
///
/// Strips markup (dropping script/style bodies), escapes stray `<`, removes
/// percent-encoded octets, and collapses control characters and whitespace.
#[must_use]
pub fn sanitize_text(raw: &str) -> String {
    let mut text: Cow<'_, str> = Cow::Borrowed(raw);

    if text.contains('<') {
        let stripped = SCRIPT_OR_STYLE.replace_all(&text, "");
        let stripped = TAG.replace_all(&stripped, "");
        text = Cow::Owned(stripped.replace('<', "&lt;"));
    }

    let mut text = WHITESPACE.replace_all(&text, " ").trim().to_string();

    // Removing one octet can splice a new one together, e.g. "%%4141".
    let mut found = false;
    while OCTET.is_match(&text) {
        text = OCTET.replace_all(&text, "").into_owned();
        found = true;
    }
    if found {
        text = WHITESPACE.replace_all(&text, " ").trim().to_string();
    }

    text
}

/// Request parameters (query string style)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams {
    params: HashMap<String, String>,
}

impl QueryParams {
    /// Empty parameter set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a parameter, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Raw, unsanitized value
    #[inline]
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Sanitized value; `None` if absent or empty after sanitizing
    #[must_use]
    pub fn sanitized(&self, name: &str) -> Option<String> {
        self.raw(name)
            .map(sanitize_text)
            .filter(|value| !value.is_empty())
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether there are no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// State for one request
///
/// Holds the resolved segment per cache group. Only the cache segmentation
/// service's membership outlives the request.
#[derive(Debug, Clone)]
pub struct RequestScope {
    visitor: VisitorId,
    kind: RequestKind,
    params: QueryParams,
    attributes: Map<String, Value>,
    resolved: BTreeMap<CacheGroup, SegmentKey>,
}

impl RequestScope {
    /// Front-end request for `visitor` with no parameters
    #[must_use]
    pub fn new(visitor: impl Into<VisitorId>) -> Self {
        Self {
            visitor: visitor.into(),
            kind: RequestKind::FrontEnd,
            params: QueryParams::new(),
            attributes: Map::new(),
            resolved: BTreeMap::new(),
        }
    }

    /// With request kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    /// With request parameters
    #[inline]
    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// With an attribute passed through to assignment strategies
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Visitor making the request
    #[inline]
    #[must_use]
    pub fn visitor(&self) -> &VisitorId {
        &self.visitor
    }

    /// Request kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Request parameters
    #[inline]
    #[must_use]
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Strategy attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Segment resolved for `group` in this request, if any
    #[inline]
    #[must_use]
    pub fn user_group(&self, group: &CacheGroup) -> Option<&SegmentKey> {
        self.resolved.get(group)
    }

    /// All resolutions so far
    pub fn resolved(&self) -> impl Iterator<Item = (&CacheGroup, &SegmentKey)> {
        self.resolved.iter()
    }

    pub(crate) fn resolve(&mut self, group: CacheGroup, segment: SegmentKey) {
        self.resolved.insert(group, segment);
    }
}
